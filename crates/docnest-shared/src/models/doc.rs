use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single document in the hierarchy.
///
/// `urlpath` is materialized from the slug chain and is only ever written
/// by the server's path materializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doc {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    pub title: String,
    pub slug: String,
    pub urlpath: String,
    pub order: i32,
    pub public: bool,
    pub markdown: String,
    pub html: String,
    pub metadata: DocMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Doc {
    /// The root is the only node without a parent.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Derived data, recomputed whenever the rendered HTML changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocMetadata {
    #[serde(default)]
    pub subtitles: Vec<DocSubtitle>,
}

/// One table-of-contents entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocSubtitle {
    pub title: String,
    pub hash: String,
}
