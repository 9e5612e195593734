use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionResponse {
    pub id: i64,
    pub doc_id: i64,
    pub markdown: String,
    pub html: String,
    pub created_by_id: Option<i64>,
    pub created_by_username: Option<String>,
    pub created_at: DateTime<Utc>,
}
