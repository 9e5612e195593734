//! In-process store used for `DATABASE_URL=memory` and by the test-suite.
//!
//! A transaction holds the store's lock for its whole lifetime and mutates a
//! private copy of the state, so transactions are fully serialized and a
//! transaction that is dropped without commit leaves no trace.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docnest_shared::{Doc, Revision, ShareLink, Upload, User};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    NewDoc, NewRevision, NewShareLink, NewUpload, NewUser, RevisionEntry, Store, Transaction,
    UserCredentials,
};
use crate::error::AppError;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    docs: BTreeMap<i64, Doc>,
    revisions: BTreeMap<i64, Revision>,
    users: BTreeMap<i64, UserCredentials>,
    share_links: BTreeMap<i64, ShareLink>,
    uploads: BTreeMap<i64, Upload>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Mirrors the unique indexes of the relational schema.
    fn check_doc_constraints(&self, doc: &Doc) -> Result<(), AppError> {
        let clash = self.docs.values().any(|other| {
            other.id != doc.id
                && (other.urlpath == doc.urlpath
                    || (other.parent_id == doc.parent_id && other.slug == doc.slug)
                    || (other.parent_id.is_none() && doc.parent_id.is_none()))
        });
        if clash {
            return Err(AppError::Conflict(
                "A document with this path already exists".to_string(),
            ));
        }
        if doc.parent_id == Some(doc.id) {
            return Err(AppError::Corrupted(format!("document {} is its own parent", doc.id)));
        }
        Ok(())
    }

    fn sorted_children(&self, parent_id: i64, public_only: bool) -> Vec<Doc> {
        let mut children: Vec<Doc> = self
            .docs
            .values()
            .filter(|d| d.parent_id == Some(parent_id) && (!public_only || d.public))
            .cloned()
            .collect();
        children.sort_by(|a, b| {
            (a.order, &a.title, a.id).cmp(&(b.order, &b.title, b.id))
        });
        children
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn paginate<T>(items: Vec<T>, offset: i64, limit: Option<i64>) -> Vec<T> {
    let offset = offset.max(0) as usize;
    let iter = items.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit.max(0) as usize).collect(),
        None => iter.collect(),
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get_doc(&mut self, id: i64) -> Result<Option<Doc>, AppError> {
        Ok(self.working.docs.get(&id).cloned())
    }

    async fn get_doc_by_urlpath(&mut self, urlpath: &str) -> Result<Option<Doc>, AppError> {
        Ok(self
            .working
            .docs
            .values()
            .find(|d| d.urlpath == urlpath)
            .cloned())
    }

    async fn get_root(&mut self) -> Result<Option<Doc>, AppError> {
        Ok(self.working.docs.values().find(|d| d.is_root()).cloned())
    }

    async fn find_child_by_slug(
        &mut self,
        parent_id: i64,
        slug: &str,
    ) -> Result<Option<Doc>, AppError> {
        Ok(self
            .working
            .docs
            .values()
            .find(|d| d.parent_id == Some(parent_id) && d.slug == slug)
            .cloned())
    }

    async fn list_children(
        &mut self,
        parent_ids: &[i64],
        public_only: bool,
    ) -> Result<Vec<Doc>, AppError> {
        let mut parents = parent_ids.to_vec();
        parents.sort_unstable();
        parents.dedup();

        Ok(parents
            .into_iter()
            .flat_map(|parent_id| self.working.sorted_children(parent_id, public_only))
            .collect())
    }

    async fn max_child_order(&mut self, parent_id: i64) -> Result<Option<i32>, AppError> {
        Ok(self
            .working
            .docs
            .values()
            .filter(|d| d.parent_id == Some(parent_id))
            .map(|d| d.order)
            .max())
    }

    async fn list_docs(
        &mut self,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<Doc>, i64), AppError> {
        let mut docs: Vec<Doc> = self.working.docs.values().cloned().collect();
        docs.sort_by(|a, b| (a.order, &a.title, a.id).cmp(&(b.order, &b.title, b.id)));
        let total = docs.len() as i64;
        Ok((paginate(docs, offset, limit), total))
    }

    async fn list_public_docs(&mut self) -> Result<Vec<Doc>, AppError> {
        let mut docs: Vec<Doc> = self
            .working
            .docs
            .values()
            .filter(|d| d.public)
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.urlpath.cmp(&b.urlpath));
        Ok(docs)
    }

    async fn insert_doc(&mut self, new: NewDoc) -> Result<Doc, AppError> {
        if let Some(parent_id) = new.parent_id {
            if !self.working.docs.contains_key(&parent_id) {
                return Err(AppError::ParentNotFound);
            }
        }

        let doc = Doc {
            id: self.working.next_id + 1,
            parent_id: new.parent_id,
            title: new.title,
            slug: new.slug,
            urlpath: new.urlpath,
            order: new.order,
            public: new.public,
            markdown: new.markdown,
            html: new.html,
            metadata: new.metadata,
            updated_by_id: new.updated_by_id,
            created_at: new.now,
            updated_at: new.now,
        };
        self.working.check_doc_constraints(&doc)?;
        self.working.allocate_id();
        self.working.docs.insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn update_doc(&mut self, doc: &Doc) -> Result<(), AppError> {
        if !self.working.docs.contains_key(&doc.id) {
            return Err(AppError::NotFound);
        }
        self.working.check_doc_constraints(doc)?;
        let mut stored = doc.clone();
        if let Some(existing) = self.working.docs.get(&doc.id) {
            stored.created_at = existing.created_at;
        }
        self.working.docs.insert(doc.id, stored);
        Ok(())
    }

    async fn set_urlpath(
        &mut self,
        id: i64,
        urlpath: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut doc = self
            .working
            .docs
            .get(&id)
            .cloned()
            .ok_or(AppError::NotFound)?;
        doc.urlpath = urlpath.to_string();
        doc.updated_at = now;
        self.working.check_doc_constraints(&doc)?;
        self.working.docs.insert(id, doc);
        Ok(())
    }

    async fn set_orders(&mut self, orders: &[(i64, i32)]) -> Result<(), AppError> {
        for (id, order) in orders {
            if let Some(doc) = self.working.docs.get_mut(id) {
                doc.order = *order;
            }
        }
        Ok(())
    }

    async fn delete_docs(&mut self, ids: &[i64]) -> Result<u64, AppError> {
        // Same reach as ON DELETE CASCADE: the listed docs and everything below them.
        let mut doomed: HashSet<i64> = ids
            .iter()
            .copied()
            .filter(|id| self.working.docs.contains_key(id))
            .collect();
        loop {
            let more: Vec<i64> = self
                .working
                .docs
                .values()
                .filter(|d| {
                    !doomed.contains(&d.id) && d.parent_id.is_some_and(|p| doomed.contains(&p))
                })
                .map(|d| d.id)
                .collect();
            if more.is_empty() {
                break;
            }
            doomed.extend(more);
        }

        let state = &mut self.working;
        state.docs.retain(|id, _| !doomed.contains(id));
        state.revisions.retain(|_, r| !doomed.contains(&r.doc_id));
        state.share_links.retain(|_, l| !doomed.contains(&l.doc_id));
        for upload in state.uploads.values_mut() {
            if upload.doc_id.is_some_and(|d| doomed.contains(&d)) {
                upload.doc_id = None;
            }
        }

        Ok(doomed.len() as u64)
    }

    async fn insert_upload(&mut self, new: NewUpload) -> Result<Upload, AppError> {
        let upload = Upload {
            id: self.working.allocate_id(),
            filename: new.filename,
            content_type: new.content_type,
            size: new.size,
            public: new.public,
            doc_id: new.doc_id,
            created_by_id: new.created_by_id,
            created_at: new.now,
        };
        self.working.uploads.insert(upload.id, upload.clone());
        Ok(upload)
    }

    async fn get_upload(&mut self, id: i64) -> Result<Option<Upload>, AppError> {
        Ok(self.working.uploads.get(&id).cloned())
    }

    async fn set_uploads_public(&mut self, doc_id: i64, public: bool) -> Result<u64, AppError> {
        let mut count = 0;
        for upload in self.working.uploads.values_mut() {
            if upload.doc_id == Some(doc_id) {
                upload.public = public;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn detach_uploads(&mut self, doc_ids: &[i64]) -> Result<u64, AppError> {
        let mut count = 0;
        for upload in self.working.uploads.values_mut() {
            if upload.doc_id.is_some_and(|d| doc_ids.contains(&d)) {
                upload.doc_id = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert_revision(&mut self, new: NewRevision) -> Result<Revision, AppError> {
        if !self.working.docs.contains_key(&new.doc_id) {
            return Err(AppError::NotFound);
        }
        let revision = Revision {
            id: self.working.allocate_id(),
            doc_id: new.doc_id,
            markdown: new.markdown,
            html: new.html,
            created_by_id: new.created_by_id,
            created_at: new.now,
        };
        self.working.revisions.insert(revision.id, revision.clone());
        Ok(revision)
    }

    async fn get_revision(
        &mut self,
        doc_id: i64,
        revision_id: i64,
    ) -> Result<Option<Revision>, AppError> {
        Ok(self
            .working
            .revisions
            .get(&revision_id)
            .filter(|r| r.doc_id == doc_id)
            .cloned())
    }

    async fn list_revisions(
        &mut self,
        doc_id: i64,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<RevisionEntry>, i64), AppError> {
        let mut revisions: Vec<Revision> = self
            .working
            .revisions
            .values()
            .filter(|r| r.doc_id == doc_id)
            .cloned()
            .collect();
        revisions.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        let total = revisions.len() as i64;

        let entries = paginate(revisions, offset, limit)
            .into_iter()
            .map(|revision| {
                let created_by_username = revision
                    .created_by_id
                    .and_then(|id| self.working.users.get(&id))
                    .map(|c| c.user.username.clone());
                RevisionEntry {
                    revision,
                    created_by_username,
                }
            })
            .collect();

        Ok((entries, total))
    }

    async fn insert_user(&mut self, new: NewUser) -> Result<User, AppError> {
        if self
            .working
            .users
            .values()
            .any(|c| c.user.username == new.username)
        {
            return Err(AppError::Conflict(
                "A user with this username already exists".to_string(),
            ));
        }
        let user = User {
            id: self.working.allocate_id(),
            username: new.username,
            role: new.role,
            created_at: new.now,
            updated_at: new.now,
        };
        self.working.users.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                password_hash: new.password_hash,
            },
        );
        Ok(user)
    }

    async fn get_user(&mut self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.working.users.get(&id).map(|c| c.user.clone()))
    }

    async fn find_user_credentials(
        &mut self,
        username: &str,
    ) -> Result<Option<UserCredentials>, AppError> {
        Ok(self
            .working
            .users
            .values()
            .find(|c| c.user.username == username)
            .cloned())
    }

    async fn list_users(
        &mut self,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<(Vec<User>, i64), AppError> {
        let users: Vec<User> = self.working.users.values().map(|c| c.user.clone()).collect();
        let total = users.len() as i64;
        Ok((paginate(users, offset, limit), total))
    }

    async fn update_user(&mut self, user: &User) -> Result<(), AppError> {
        if self
            .working
            .users
            .values()
            .any(|c| c.user.id != user.id && c.user.username == user.username)
        {
            return Err(AppError::Conflict(
                "A user with this username already exists".to_string(),
            ));
        }
        let stored = self.working.users.get_mut(&user.id).ok_or(AppError::NotFound)?;
        stored.user.username = user.username.clone();
        stored.user.role = user.role;
        stored.user.updated_at = user.updated_at;
        Ok(())
    }

    async fn set_password_hash(
        &mut self,
        id: i64,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let stored = self.working.users.get_mut(&id).ok_or(AppError::NotFound)?;
        stored.password_hash = password_hash.to_string();
        stored.user.updated_at = now;
        Ok(())
    }

    async fn delete_user(&mut self, id: i64) -> Result<bool, AppError> {
        // Same reach as ON DELETE SET NULL on every author column.
        let state = &mut self.working;
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }
        let clear = |author: &mut Option<i64>| {
            if *author == Some(id) {
                *author = None;
            }
        };
        state.docs.values_mut().for_each(|d| clear(&mut d.updated_by_id));
        state.revisions.values_mut().for_each(|r| clear(&mut r.created_by_id));
        state.uploads.values_mut().for_each(|u| clear(&mut u.created_by_id));
        state.share_links.values_mut().for_each(|l| clear(&mut l.created_by_id));
        Ok(true)
    }

    async fn insert_share_link(&mut self, new: NewShareLink) -> Result<ShareLink, AppError> {
        if !self.working.docs.contains_key(&new.doc_id) {
            return Err(AppError::NotFound);
        }
        if self.working.share_links.values().any(|l| l.token == new.token) {
            return Err(AppError::Conflict(
                "A share link with this token already exists".to_string(),
            ));
        }
        let link = ShareLink {
            id: self.working.allocate_id(),
            token: new.token,
            doc_id: new.doc_id,
            created_by_id: new.created_by_id,
            expires_at: new.expires_at,
            last_accessed_at: None,
            access_count: 0,
            created_at: new.now,
            updated_at: new.now,
        };
        self.working.share_links.insert(link.id, link.clone());
        Ok(link)
    }

    async fn get_share_link(&mut self, id: i64) -> Result<Option<ShareLink>, AppError> {
        Ok(self.working.share_links.get(&id).cloned())
    }

    async fn get_share_link_by_token(
        &mut self,
        token: &str,
    ) -> Result<Option<ShareLink>, AppError> {
        Ok(self
            .working
            .share_links
            .values()
            .find(|l| l.token == token)
            .cloned())
    }

    async fn list_share_links(
        &mut self,
        doc_id: i64,
        created_by_id: Option<i64>,
    ) -> Result<Vec<ShareLink>, AppError> {
        let mut links: Vec<ShareLink> = self
            .working
            .share_links
            .values()
            .filter(|l| l.doc_id == doc_id)
            .filter(|l| created_by_id.is_none() || l.created_by_id == created_by_id)
            .cloned()
            .collect();
        links.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(links)
    }

    async fn delete_share_link(&mut self, id: i64) -> Result<(), AppError> {
        self.working
            .share_links
            .remove(&id)
            .map(|_| ())
            .ok_or(AppError::NotFound)
    }

    async fn record_share_access(
        &mut self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<ShareLink, AppError> {
        let link = self
            .working
            .share_links
            .get_mut(&id)
            .ok_or(AppError::NotFound)?;
        link.last_accessed_at = Some(now);
        link.access_count += 1;
        Ok(link.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
