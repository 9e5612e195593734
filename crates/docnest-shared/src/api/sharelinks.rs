use serde::{Deserialize, Serialize};

use crate::models::ShareExpiration;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateShareLinkRequest {
    pub doc_id: i64,
    #[serde(default)]
    pub expiration: ShareExpiration,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareLinkListParams {
    pub doc_id: i64,
}
