pub mod auth;
pub mod docs;
pub mod search;
pub mod sharelinks;
pub mod sitemap;
pub mod users;
