mod doc;
mod revision;
mod sharelink;
mod upload;
mod user;

pub use doc::*;
pub use revision::*;
pub use sharelink::*;
pub use upload::*;
pub use user::*;
