pub mod auth;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod handlers;
pub mod indexing;
pub mod revisions;
pub mod routes;
pub mod tree;

pub use config::Config;
pub use error::AppError;
pub use routes::{create_router, AppState};
