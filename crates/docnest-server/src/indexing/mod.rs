//! Bridge to the external search engine.
//!
//! The tree store only calls into the index after a transaction commits;
//! failures are logged and never undo the mutation.

mod meilisearch;

use async_trait::async_trait;
use docnest_shared::{api::SearchResponse, Doc};
use serde::{Deserialize, Serialize};

use crate::content;
use crate::error::AppError;

pub use meilisearch::MeilisearchIndex;

/// Queries shorter than this return no results without hitting the engine.
pub const MIN_QUERY_LEN: usize = 3;

/// The shape a document takes inside the search index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDoc {
    pub id: String,
    pub urlpath: String,
    pub urlpathbase: String,
    pub title: String,
    pub text: String,
    pub public: bool,
}

impl From<&Doc> for IndexedDoc {
    fn from(doc: &Doc) -> Self {
        Self {
            id: doc.id.to_string(),
            urlpath: doc.urlpath.clone(),
            urlpathbase: doc
                .urlpath
                .split('/')
                .find(|s| !s.is_empty())
                .unwrap_or_default()
                .to_string(),
            title: doc.title.clone(),
            text: content::plain_text(&doc.html),
            public: doc.public,
        }
    }
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    fn enabled(&self) -> bool;

    async fn index_documents(&self, docs: &[Doc]) -> anyhow::Result<()>;

    async fn delete_documents(&self, ids: &[i64]) -> anyhow::Result<()>;

    async fn search(&self, query: &str, public_only: bool) -> anyhow::Result<SearchResponse>;
}

/// Index used when search is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledIndex;

#[async_trait]
impl SearchIndex for DisabledIndex {
    fn enabled(&self) -> bool {
        false
    }

    async fn index_documents(&self, _docs: &[Doc]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn delete_documents(&self, _ids: &[i64]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn search(&self, _query: &str, _public_only: bool) -> anyhow::Result<SearchResponse> {
        Ok(SearchResponse {
            total: 0,
            results: Vec::new(),
        })
    }
}

/// Runs a search on behalf of a caller, applying the availability and
/// minimum-length rules.
pub async fn search_documents(
    index: &dyn SearchIndex,
    query: &str,
    public_only: bool,
) -> Result<SearchResponse, AppError> {
    if !index.enabled() {
        return Err(AppError::SearchDisabled);
    }
    let query = query.trim();
    if query.chars().count() < MIN_QUERY_LEN {
        return Ok(SearchResponse {
            total: 0,
            results: Vec::new(),
        });
    }
    Ok(index.search(query, public_only).await?)
}
