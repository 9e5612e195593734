//! Persistence boundary.
//!
//! Every mutation runs inside one [`Transaction`]; nothing is visible to other
//! callers until [`Transaction::commit`] succeeds, and dropping a transaction
//! rolls it back.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use docnest_shared::{Doc, DocMetadata, Revision, Role, ShareLink, Upload, User};

use crate::error::AppError;

pub use memory::MemoryStore;
pub use postgres::{create_pool, DbPool, PgStore};

/// Current time at the precision Postgres stores, so values read back
/// compare equal to values written.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[derive(Debug, Clone)]
pub struct NewDoc {
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
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRevision {
    pub doc_id: i64,
    pub markdown: String,
    pub html: String,
    pub created_by_id: Option<i64>,
    pub now: DateTime<Utc>,
}

/// A revision joined with its author's username, if the author still exists.
#[derive(Debug, Clone)]
pub struct RevisionEntry {
    pub revision: Revision,
    pub created_by_username: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewShareLink {
    pub token: String,
    pub doc_id: i64,
    pub created_by_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUpload {
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub public: bool,
    pub doc_id: Option<i64>,
    pub created_by_id: Option<i64>,
    pub now: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError>;
}

#[async_trait]
pub trait Transaction: Send {
    async fn get_doc(&mut self, id: i64) -> Result<Option<Doc>, AppError>;
    async fn get_doc_by_urlpath(&mut self, urlpath: &str) -> Result<Option<Doc>, AppError>;
    async fn get_root(&mut self) -> Result<Option<Doc>, AppError>;
    async fn find_child_by_slug(
        &mut self,
        parent_id: i64,
        slug: &str,
    ) -> Result<Option<Doc>, AppError>;
    /// Children of all given parents, ordered by `(parent_id, order, title, id)`.
    async fn list_children(
        &mut self,
        parent_ids: &[i64],
        public_only: bool,
    ) -> Result<Vec<Doc>, AppError>;
    async fn max_child_order(&mut self, parent_id: i64) -> Result<Option<i32>, AppError>;
    async fn list_docs(
        &mut self,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<Doc>, i64), AppError>;
    async fn list_public_docs(&mut self) -> Result<Vec<Doc>, AppError>;
    async fn insert_doc(&mut self, doc: NewDoc) -> Result<Doc, AppError>;
    /// Persists every mutable column of `doc`.
    async fn update_doc(&mut self, doc: &Doc) -> Result<(), AppError>;
    async fn set_urlpath(
        &mut self,
        id: i64,
        urlpath: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;
    async fn set_orders(&mut self, orders: &[(i64, i32)]) -> Result<(), AppError>;
    async fn delete_docs(&mut self, ids: &[i64]) -> Result<u64, AppError>;

    async fn insert_upload(&mut self, upload: NewUpload) -> Result<Upload, AppError>;
    async fn get_upload(&mut self, id: i64) -> Result<Option<Upload>, AppError>;
    async fn set_uploads_public(&mut self, doc_id: i64, public: bool) -> Result<u64, AppError>;
    async fn detach_uploads(&mut self, doc_ids: &[i64]) -> Result<u64, AppError>;

    async fn insert_revision(&mut self, revision: NewRevision) -> Result<Revision, AppError>;
    async fn get_revision(
        &mut self,
        doc_id: i64,
        revision_id: i64,
    ) -> Result<Option<Revision>, AppError>;
    /// Newest first.
    async fn list_revisions(
        &mut self,
        doc_id: i64,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<RevisionEntry>, i64), AppError>;

    async fn insert_user(&mut self, user: NewUser) -> Result<User, AppError>;
    async fn get_user(&mut self, id: i64) -> Result<Option<User>, AppError>;
    async fn find_user_credentials(
        &mut self,
        username: &str,
    ) -> Result<Option<UserCredentials>, AppError>;
    async fn list_users(
        &mut self,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<User>, i64), AppError>;
    /// Persists `username`, `role` and `updated_at`.
    async fn update_user(&mut self, user: &User) -> Result<(), AppError>;
    async fn set_password_hash(
        &mut self,
        id: i64,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;
    /// Authored documents, revisions, uploads and share links survive with
    /// their author reference cleared.
    async fn delete_user(&mut self, id: i64) -> Result<bool, AppError>;

    async fn insert_share_link(&mut self, link: NewShareLink) -> Result<ShareLink, AppError>;
    async fn get_share_link(&mut self, id: i64) -> Result<Option<ShareLink>, AppError>;
    async fn get_share_link_by_token(&mut self, token: &str)
        -> Result<Option<ShareLink>, AppError>;
    async fn list_share_links(
        &mut self,
        doc_id: i64,
        created_by_id: Option<i64>,
    ) -> Result<Vec<ShareLink>, AppError>;
    async fn delete_share_link(&mut self, id: i64) -> Result<(), AppError>;
    async fn record_share_access(
        &mut self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<ShareLink, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}
