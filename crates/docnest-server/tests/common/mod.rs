#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docnest_server::{
    auth::Actor,
    db::{
        self, MemoryStore, NewDoc, NewRevision, NewShareLink, NewUpload, NewUser,
        RevisionEntry, Store, Transaction, UserCredentials,
    },
    error::AppError,
    indexing::SearchIndex,
    tree::TreeStore,
};
use docnest_shared::{
    api::{CreateDocRequest, SearchHit, SearchResponse},
    Doc, Revision, Role, ShareLink, Upload, User,
};

/// Search index that remembers every call and can be told to fail.
#[derive(Default)]
pub struct RecordingIndex {
    indexed: Mutex<Vec<Doc>>,
    deleted: Mutex<Vec<i64>>,
    fail: AtomicBool,
}

impl RecordingIndex {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn indexed(&self) -> Vec<Doc> {
        self.indexed.lock().unwrap().clone()
    }

    pub fn indexed_ids(&self) -> Vec<i64> {
        self.indexed().iter().map(|d| d.id).collect()
    }

    /// Latest indexed version of a document.
    pub fn latest(&self, id: i64) -> Option<Doc> {
        self.indexed().into_iter().rev().find(|d| d.id == id)
    }

    pub fn deleted(&self) -> Vec<i64> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.indexed.lock().unwrap().clear();
        self.deleted.lock().unwrap().clear();
    }
}

#[async_trait]
impl SearchIndex for RecordingIndex {
    fn enabled(&self) -> bool {
        true
    }

    async fn index_documents(&self, docs: &[Doc]) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("search engine unavailable");
        }
        self.indexed.lock().unwrap().extend_from_slice(docs);
        Ok(())
    }

    async fn delete_documents(&self, ids: &[i64]) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("search engine unavailable");
        }
        self.deleted.lock().unwrap().extend_from_slice(ids);
        Ok(())
    }

    async fn search(&self, query: &str, public_only: bool) -> anyhow::Result<SearchResponse> {
        let deleted = self.deleted();
        let mut latest: HashMap<i64, Doc> = HashMap::new();
        for doc in self.indexed() {
            latest.insert(doc.id, doc);
        }
        let mut results: Vec<SearchHit> = latest
            .into_values()
            .filter(|d| !deleted.contains(&d.id))
            .filter(|d| !public_only || d.public)
            .filter(|d| d.title.to_lowercase().contains(&query.to_lowercase()))
            .map(|d| SearchHit {
                id: d.id,
                title: d.title,
                urlpath: d.urlpath,
                text: String::new(),
                public: d.public,
            })
            .collect();
        results.sort_by_key(|h| h.id);
        Ok(SearchResponse {
            total: results.len(),
            results,
        })
    }
}

/// Store operations a [`FaultyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    SetUrlpath,
    InsertRevision,
    DeleteDocs,
    SetUploadsPublic,
}

/// Wraps the memory store and fails one chosen operation inside every
/// transaction begun while the fault is armed.
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    fault: Mutex<Option<Fault>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fault: Mutex::new(None),
        }
    }

    pub fn arm(&self, fault: Fault) {
        *self.fault.lock().unwrap() = Some(fault);
    }

    pub fn disarm(&self) {
        *self.fault.lock().unwrap() = None;
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError> {
        let fault = *self.fault.lock().unwrap();
        let inner = self.inner.begin().await?;
        Ok(Box::new(FaultyTransaction { inner, fault }))
    }
}

struct FaultyTransaction {
    inner: Box<dyn Transaction>,
    fault: Option<Fault>,
}

impl FaultyTransaction {
    fn check(&self, op: Fault) -> Result<(), AppError> {
        if self.fault == Some(op) {
            return Err(AppError::Internal(anyhow::anyhow!(
                "storage failure during {op:?}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for FaultyTransaction {
    async fn get_doc(&mut self, id: i64) -> Result<Option<Doc>, AppError> {
        self.inner.get_doc(id).await
    }

    async fn get_doc_by_urlpath(&mut self, urlpath: &str) -> Result<Option<Doc>, AppError> {
        self.inner.get_doc_by_urlpath(urlpath).await
    }

    async fn get_root(&mut self) -> Result<Option<Doc>, AppError> {
        self.inner.get_root().await
    }

    async fn find_child_by_slug(
        &mut self,
        parent_id: i64,
        slug: &str,
    ) -> Result<Option<Doc>, AppError> {
        self.inner.find_child_by_slug(parent_id, slug).await
    }

    async fn list_children(
        &mut self,
        parent_ids: &[i64],
        public_only: bool,
    ) -> Result<Vec<Doc>, AppError> {
        self.inner.list_children(parent_ids, public_only).await
    }

    async fn max_child_order(&mut self, parent_id: i64) -> Result<Option<i32>, AppError> {
        self.inner.max_child_order(parent_id).await
    }

    async fn list_docs(
        &mut self,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<Doc>, i64), AppError> {
        self.inner.list_docs(offset, limit).await
    }

    async fn list_public_docs(&mut self) -> Result<Vec<Doc>, AppError> {
        self.inner.list_public_docs().await
    }

    async fn insert_doc(&mut self, doc: NewDoc) -> Result<Doc, AppError> {
        self.inner.insert_doc(doc).await
    }

    async fn update_doc(&mut self, doc: &Doc) -> Result<(), AppError> {
        self.inner.update_doc(doc).await
    }

    async fn set_urlpath(
        &mut self,
        id: i64,
        urlpath: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.check(Fault::SetUrlpath)?;
        self.inner.set_urlpath(id, urlpath, now).await
    }

    async fn set_orders(&mut self, orders: &[(i64, i32)]) -> Result<(), AppError> {
        self.inner.set_orders(orders).await
    }

    async fn delete_docs(&mut self, ids: &[i64]) -> Result<u64, AppError> {
        self.check(Fault::DeleteDocs)?;
        self.inner.delete_docs(ids).await
    }

    async fn insert_upload(&mut self, upload: NewUpload) -> Result<Upload, AppError> {
        self.inner.insert_upload(upload).await
    }

    async fn get_upload(&mut self, id: i64) -> Result<Option<Upload>, AppError> {
        self.inner.get_upload(id).await
    }

    async fn set_uploads_public(&mut self, doc_id: i64, public: bool) -> Result<u64, AppError> {
        self.check(Fault::SetUploadsPublic)?;
        self.inner.set_uploads_public(doc_id, public).await
    }

    async fn detach_uploads(&mut self, doc_ids: &[i64]) -> Result<u64, AppError> {
        self.inner.detach_uploads(doc_ids).await
    }

    async fn insert_revision(&mut self, revision: NewRevision) -> Result<Revision, AppError> {
        self.check(Fault::InsertRevision)?;
        self.inner.insert_revision(revision).await
    }

    async fn get_revision(
        &mut self,
        doc_id: i64,
        revision_id: i64,
    ) -> Result<Option<Revision>, AppError> {
        self.inner.get_revision(doc_id, revision_id).await
    }

    async fn list_revisions(
        &mut self,
        doc_id: i64,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<RevisionEntry>, i64), AppError> {
        self.inner.list_revisions(doc_id, offset, limit).await
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, AppError> {
        self.inner.insert_user(user).await
    }

    async fn get_user(&mut self, id: i64) -> Result<Option<User>, AppError> {
        self.inner.get_user(id).await
    }

    async fn find_user_credentials(
        &mut self,
        username: &str,
    ) -> Result<Option<UserCredentials>, AppError> {
        self.inner.find_user_credentials(username).await
    }

    async fn list_users(
        &mut self,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<User>, i64), AppError> {
        self.inner.list_users(offset, limit).await
    }

    async fn update_user(&mut self, user: &User) -> Result<(), AppError> {
        self.inner.update_user(user).await
    }

    async fn set_password_hash(
        &mut self,
        id: i64,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.inner.set_password_hash(id, password_hash, now).await
    }

    async fn delete_user(&mut self, id: i64) -> Result<bool, AppError> {
        self.inner.delete_user(id).await
    }

    async fn insert_share_link(&mut self, link: NewShareLink) -> Result<ShareLink, AppError> {
        self.inner.insert_share_link(link).await
    }

    async fn get_share_link(&mut self, id: i64) -> Result<Option<ShareLink>, AppError> {
        self.inner.get_share_link(id).await
    }

    async fn get_share_link_by_token(
        &mut self,
        token: &str,
    ) -> Result<Option<ShareLink>, AppError> {
        self.inner.get_share_link_by_token(token).await
    }

    async fn list_share_links(
        &mut self,
        doc_id: i64,
        created_by_id: Option<i64>,
    ) -> Result<Vec<ShareLink>, AppError> {
        self.inner.list_share_links(doc_id, created_by_id).await
    }

    async fn delete_share_link(&mut self, id: i64) -> Result<(), AppError> {
        self.inner.delete_share_link(id).await
    }

    async fn record_share_access(
        &mut self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<ShareLink, AppError> {
        self.inner.record_share_access(id, now).await
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.inner.commit().await
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub faults: Arc<FaultyStore>,
    pub index: Arc<RecordingIndex>,
    pub tree: TreeStore,
    pub root: Doc,
    pub editor: Actor,
    pub admin: Actor,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(RecordingIndex::default());
        let faults = Arc::new(FaultyStore::new(store.clone()));
        let tree = TreeStore::new(faults.clone(), index.clone());
        let root = tree.bootstrap_root("Home").await.unwrap();

        let editor_user = insert_user(store.as_ref(), "editor", Role::Editor).await;
        let admin_user = insert_user(store.as_ref(), "admin", Role::Admin).await;
        index.clear();

        Self {
            store,
            faults,
            index,
            tree,
            root,
            editor: Actor::user(editor_user.id, editor_user.username, Role::Editor),
            admin: Actor::user(admin_user.id, admin_user.username, Role::Admin),
        }
    }

    pub async fn create(&self, parent_id: i64, slug: &str) -> Doc {
        self.create_with(parent_id, slug, true).await
    }

    pub async fn create_with(&self, parent_id: i64, slug: &str, public: bool) -> Doc {
        self.tree
            .create(
                &self.editor,
                CreateDocRequest {
                    parent_id,
                    title: slug.to_string(),
                    slug: slug.to_string(),
                    public,
                },
            )
            .await
            .unwrap()
            .doc
    }

    pub async fn doc(&self, id: i64) -> Option<Doc> {
        let mut tx = self.store.begin().await.unwrap();
        tx.get_doc(id).await.unwrap()
    }

    pub async fn all_docs(&self) -> Vec<Doc> {
        let mut tx = self.store.begin().await.unwrap();
        tx.list_docs(0, None).await.unwrap().0
    }

    pub async fn attach_upload(&self, doc_id: i64, public: bool) -> Upload {
        let mut tx = self.store.begin().await.unwrap();
        let upload = tx
            .insert_upload(NewUpload {
                filename: "diagram.png".to_string(),
                content_type: "image/png".to_string(),
                size: 1024,
                public,
                doc_id: Some(doc_id),
                created_by_id: self.editor.user_id,
                now: db::now(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        upload
    }

    pub async fn upload(&self, id: i64) -> Upload {
        let mut tx = self.store.begin().await.unwrap();
        tx.get_upload(id).await.unwrap().unwrap()
    }

    /// Every document's urlpath must equal the one derived from its slug
    /// chain.
    pub async fn assert_paths_consistent(&self) {
        let docs = self.all_docs().await;
        let by_id: HashMap<i64, &Doc> = docs.iter().map(|d| (d.id, d)).collect();
        for doc in &docs {
            let mut slugs = Vec::new();
            let mut current: &Doc = doc;
            while let Some(parent_id) = current.parent_id {
                slugs.push(current.slug.as_str());
                current = by_id[&parent_id];
            }
            slugs.reverse();
            let expected = if slugs.is_empty() {
                "/".to_string()
            } else {
                format!("/{}", slugs.join("/"))
            };
            assert_eq!(doc.urlpath, expected, "document {} has a stale urlpath", doc.id);
        }
    }
}

pub async fn insert_user(store: &dyn Store, username: &str, role: Role) -> User {
    let mut tx = store.begin().await.unwrap();
    let user = tx
        .insert_user(NewUser {
            username: username.to_string(),
            password_hash: docnest_server::auth::hash_password("password123").unwrap(),
            role,
            now: db::now(),
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();
    user
}
