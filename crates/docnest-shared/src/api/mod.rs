mod auth;
mod docs;
mod pagination;
mod revisions;
mod search;
mod sharelinks;

pub use auth::*;
pub use docs::*;
pub use pagination::*;
pub use revisions::*;
pub use search::*;
pub use sharelinks::*;
