use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An uploaded file. Only the columns the document tree touches matter here:
/// visibility follows the attached document, and deleting the document
/// detaches the upload rather than deleting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub id: i64,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
