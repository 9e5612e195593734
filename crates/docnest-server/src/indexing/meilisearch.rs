use anyhow::{Context, Result};
use async_trait::async_trait;
use docnest_shared::{
    api::{SearchHit, SearchResponse},
    Doc,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{IndexedDoc, SearchIndex};
use crate::config::SearchConfig;

const RESULT_LIMIT: usize = 20;
const CROP_LENGTH: usize = 100;

/// Meilisearch over its HTTP API.
pub struct MeilisearchIndex {
    client: Client,
    base_url: String,
    api_key: String,
    index: String,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    hits: Vec<RawHit>,
    #[serde(rename = "estimatedTotalHits", default)]
    estimated_total_hits: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    id: String,
    urlpath: String,
    public: bool,
    title: String,
    #[serde(default)]
    text: String,
    #[serde(rename = "_formatted", default)]
    formatted: Option<FormattedHit>,
}

#[derive(Debug, Deserialize)]
struct FormattedHit {
    title: Option<String>,
    text: Option<String>,
}

impl MeilisearchIndex {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            index: config.index_name.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/indexes/{}{}", self.base_url, self.index, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }

    /// Creates the index if missing and pushes the ranking/filter settings.
    pub async fn ensure_index(&self) -> Result<()> {
        let response = self
            .authorized(self.client.get(self.url("")))
            .send()
            .await
            .context("failed to reach the search engine")?;

        if response.status() == StatusCode::NOT_FOUND {
            self.authorized(self.client.post(format!("{}/indexes", self.base_url)))
                .json(&json!({ "uid": self.index, "primaryKey": "id" }))
                .send()
                .await?
                .error_for_status()
                .context("failed to create search index")?;
        } else {
            response
                .error_for_status()
                .context("failed to look up search index")?;
        }

        self.authorized(self.client.patch(self.url("/settings")))
            .json(&index_settings())
            .send()
            .await?
            .error_for_status()
            .context("failed to update search index settings")?;

        Ok(())
    }
}

fn index_settings() -> Value {
    json!({
        "searchableAttributes": ["title", "text", "urlpath", "urlpathbase"],
        "displayedAttributes": ["id", "title", "urlpath", "text", "public"],
        "stopWords": [
            "the", "and", "is", "to", "a", "of", "in", "for", "on", "with", "as", "that", "by"
        ],
        "rankingRules": ["typo", "words", "proximity", "attribute", "exactness"],
        "filterableAttributes": ["public"],
        "typoTolerance": {
            "enabled": true,
            "disableOnAttributes": ["urlpathbase"],
            "minWordSizeForTypos": { "oneTypo": 5, "twoTypos": 10 }
        },
        "pagination": { "maxTotalHits": 1000 }
    })
}

#[async_trait]
impl SearchIndex for MeilisearchIndex {
    fn enabled(&self) -> bool {
        true
    }

    async fn index_documents(&self, docs: &[Doc]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let payload: Vec<IndexedDoc> = docs.iter().map(IndexedDoc::from).collect();
        self.authorized(self.client.put(self.url("/documents?primaryKey=id")))
            .json(&payload)
            .send()
            .await?
            .error_for_status()
            .context("failed to index documents")?;
        Ok(())
    }

    async fn delete_documents(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = ids.iter().map(i64::to_string).collect();
        self.authorized(self.client.post(self.url("/documents/delete-batch")))
            .json(&ids)
            .send()
            .await?
            .error_for_status()
            .context("failed to delete documents from index")?;
        Ok(())
    }

    async fn search(&self, query: &str, public_only: bool) -> Result<SearchResponse> {
        let filter: Vec<&str> = if public_only {
            vec!["public = true"]
        } else {
            Vec::new()
        };

        let results: SearchResults = self
            .authorized(self.client.post(self.url("/search")))
            .json(&json!({
                "q": query,
                "filter": filter,
                "limit": RESULT_LIMIT,
                "offset": 0,
                "attributesToRetrieve": ["id", "title", "urlpath", "public", "text"],
                "attributesToCrop": ["text"],
                "cropLength": CROP_LENGTH,
                "cropMarker": "...",
                "attributesToHighlight": ["title", "text"],
                "highlightPreTag": "<em class='search-highlight'>",
                "highlightPostTag": "</em>",
            }))
            .send()
            .await?
            .error_for_status()
            .context("search request failed")?
            .json()
            .await
            .context("invalid search response")?;

        let hits = results
            .hits
            .into_iter()
            .map(|hit| {
                let formatted = hit.formatted.unwrap_or(FormattedHit {
                    title: None,
                    text: None,
                });
                Ok(SearchHit {
                    id: hit.id.parse().context("non-numeric document id in index")?,
                    title: formatted.title.unwrap_or(hit.title),
                    urlpath: hit.urlpath,
                    text: formatted.text.unwrap_or(hit.text),
                    public: hit.public,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SearchResponse {
            total: results.estimated_total_hits.unwrap_or(hits.len()),
            results: hits,
        })
    }
}
