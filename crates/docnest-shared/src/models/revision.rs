use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable content snapshot of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: i64,
    pub doc_id: i64,
    pub markdown: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
