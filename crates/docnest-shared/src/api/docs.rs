use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Doc, DocMetadata};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateDocRequest {
    pub parent_id: i64,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub public: bool,
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateDocRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
}

impl UpdateDocRequest {
    pub fn is_structural(&self) -> bool {
        self.parent_id.is_some() || self.slug.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MoveDocParams {
    pub direction: MoveDirection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestoreRevisionParams {
    pub revision_id: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GetDocParams {
    #[serde(default)]
    pub include_source: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocByPathParams {
    pub path: String,
    #[serde(default)]
    pub include_source: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutlineParams {
    #[serde(default = "default_outline_depth")]
    pub depth: u32,
}

impl Default for OutlineParams {
    fn default() -> Self {
        Self {
            depth: default_outline_depth(),
        }
    }
}

fn default_outline_depth() -> u32 {
    100
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListDocsParams {
    #[serde(default)]
    pub include_content: bool,
}

/// Compact reference used for breadcrumbs and child listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocInfo {
    pub id: i64,
    pub urlpath: String,
    pub title: String,
}

impl From<&Doc> for DocInfo {
    fn from(doc: &Doc) -> Self {
        Self {
            id: doc.id,
            urlpath: doc.urlpath.clone(),
            title: doc.title.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocResponse {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub title: String,
    pub slug: String,
    pub urlpath: String,
    pub order: i32,
    pub public: bool,
    pub markdown: String,
    pub html: String,
    pub metadata: DocMetadata,
    pub updated_by_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub parents: Vec<DocInfo>,
    #[serde(default)]
    pub children: Vec<DocInfo>,
}

impl From<Doc> for DocResponse {
    fn from(doc: Doc) -> Self {
        Self {
            id: doc.id,
            parent_id: doc.parent_id,
            title: doc.title,
            slug: doc.slug,
            urlpath: doc.urlpath,
            order: doc.order,
            public: doc.public,
            markdown: doc.markdown,
            html: doc.html,
            metadata: doc.metadata,
            updated_by_id: doc.updated_by_id,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            parents: Vec::new(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocTreeNode {
    pub id: i64,
    pub title: String,
    pub urlpath: String,
    pub public: bool,
    #[serde(default)]
    pub children: Vec<DocTreeNode>,
}
