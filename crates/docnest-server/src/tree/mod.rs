//! The document hierarchy.
//!
//! Every mutation runs in a single store transaction: validation, the write
//! itself, urlpath cascades, upload visibility and revision appends either
//! all land or none do. The search index is only told about a change after
//! the transaction has committed.

pub mod ordering;
pub mod slug;
pub mod urlpath;

use std::collections::HashMap;
use std::sync::Arc;

use docnest_shared::{
    api::{
        CreateDocRequest, DocTreeNode, MoveDirection, Paginated, PaginationParams,
        RevisionResponse, UpdateDocRequest,
    },
    Doc, DocMetadata,
};
use tracing::{info, warn};

use crate::auth::Actor;
use crate::content;
use crate::db::{self, NewDoc, Store, Transaction};
use crate::error::AppError;
use crate::indexing::SearchIndex;
use crate::revisions;

pub use slug::validate_slug;
pub use urlpath::MAX_TREE_DEPTH;

/// A document together with its breadcrumb and the children the caller may
/// see.
#[derive(Debug, Clone)]
pub struct DocView {
    pub doc: Doc,
    /// Nearest ancestor first.
    pub parents: Vec<Doc>,
    pub children: Vec<Doc>,
}

/// Who is reading. Anonymous readers only see public documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    PublicOnly,
    All,
}

impl Visibility {
    pub fn for_actor(actor: &Actor) -> Self {
        if actor.is_authenticated() {
            Self::All
        } else {
            Self::PublicOnly
        }
    }

    fn public_only(self) -> bool {
        self == Self::PublicOnly
    }

    fn allows(self, doc: &Doc) -> bool {
        doc.public || self == Self::All
    }
}

#[derive(Clone)]
pub struct TreeStore {
    store: Arc<dyn Store>,
    index: Arc<dyn SearchIndex>,
}

impl TreeStore {
    pub fn new(store: Arc<dyn Store>, index: Arc<dyn SearchIndex>) -> Self {
        Self { store, index }
    }

    /// Creates the root document unless one already exists.
    pub async fn bootstrap_root(&self, title: &str) -> Result<Doc, AppError> {
        let mut tx = self.store.begin().await?;
        if let Some(root) = tx.get_root().await? {
            return Ok(root);
        }

        let rendered = content::render("");
        let root = tx
            .insert_doc(NewDoc {
                parent_id: None,
                title: title.to_string(),
                slug: String::new(),
                urlpath: urlpath::ROOT_URLPATH.to_string(),
                order: 0,
                public: true,
                markdown: String::new(),
                html: rendered.html,
                metadata: rendered.metadata,
                updated_by_id: None,
                now: db::now(),
            })
            .await?;
        tx.commit().await?;

        info!(doc_id = root.id, "Created root document");
        self.reindex(std::slice::from_ref(&root)).await;
        Ok(root)
    }

    pub async fn create(&self, actor: &Actor, req: CreateDocRequest) -> Result<DocView, AppError> {
        let user_id = actor.require_editor()?;
        validate_slug(&req.slug)?;

        let mut tx = self.store.begin().await?;
        let parent = tx
            .get_doc(req.parent_id)
            .await?
            .ok_or(AppError::ParentNotFound)?;
        urlpath::ensure_depth(urlpath::depth(&parent.urlpath) + 1)?;
        if tx.find_child_by_slug(parent.id, &req.slug).await?.is_some() {
            return Err(AppError::DuplicateSlug(req.slug));
        }

        let order = next_child_order(tx.as_mut(), parent.id).await?;
        let doc = tx
            .insert_doc(NewDoc {
                parent_id: Some(parent.id),
                urlpath: urlpath::child_urlpath(&parent.urlpath, &req.slug),
                title: req.title,
                slug: req.slug,
                order,
                public: req.public,
                markdown: String::new(),
                html: String::new(),
                metadata: DocMetadata::default(),
                updated_by_id: Some(user_id),
                now: db::now(),
            })
            .await?;
        let view = load_view(tx.as_mut(), doc, Visibility::All).await?;
        tx.commit().await?;

        info!(doc_id = view.doc.id, urlpath = %view.doc.urlpath, user = actor.name(), "Document created");
        self.reindex(std::slice::from_ref(&view.doc)).await;
        Ok(view)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: i64,
        req: UpdateDocRequest,
    ) -> Result<DocView, AppError> {
        if let Some(slug) = &req.slug {
            validate_slug(slug)?;
        }

        let mut tx = self.store.begin().await?;
        let mut doc = tx.get_doc(id).await?.ok_or(AppError::NotFound)?;
        let user_id = actor.require_editor()?;
        if doc.is_root() && req.is_structural() {
            return Err(AppError::ForbiddenRootMutation);
        }

        let now = db::now();
        let mut structural = false;

        if let Some(parent_id) = req.parent_id {
            if parent_id == doc.id {
                return Err(AppError::CircularReference(
                    "Cannot set a document as its own parent",
                ));
            }
            let parent = tx
                .get_doc(parent_id)
                .await?
                .ok_or(AppError::ParentNotFound)?;
            let chain = urlpath::ancestors(tx.as_mut(), &parent).await?;
            if chain.iter().any(|ancestor| ancestor.id == doc.id) {
                return Err(AppError::CircularReference(
                    "Cannot set a document as a child of its own descendant",
                ));
            }
            if doc.parent_id != Some(parent_id) {
                let height = urlpath::subtree_height(tx.as_mut(), doc.id).await?;
                urlpath::ensure_depth(chain.len() + 1 + height)?;
                doc.parent_id = Some(parent_id);
                doc.order = next_child_order(tx.as_mut(), parent_id).await?;
                structural = true;
            }
        }

        if let Some(slug) = req.slug {
            if slug != doc.slug {
                doc.slug = slug;
                structural = true;
            }
        }

        if structural {
            if let Some(parent_id) = doc.parent_id {
                if let Some(existing) = tx.find_child_by_slug(parent_id, &doc.slug).await? {
                    if existing.id != doc.id {
                        return Err(AppError::DuplicateSlug(doc.slug));
                    }
                }
            }
        }

        if let Some(title) = req.title {
            doc.title = title;
        }
        let public_changed = match req.public {
            Some(public) => {
                doc.public = public;
                true
            }
            None => false,
        };
        let content_changed = match req.markdown {
            Some(markdown) => {
                let rendered = content::render(&markdown);
                doc.markdown = markdown;
                doc.html = rendered.html;
                doc.metadata = rendered.metadata;
                true
            }
            None => false,
        };

        doc.updated_by_id = Some(user_id);
        doc.updated_at = now;

        let mut moved = Vec::new();
        if structural {
            doc.urlpath = urlpath::materialize(tx.as_mut(), &doc).await?;
            tx.update_doc(&doc).await?;
            moved = urlpath::cascade(tx.as_mut(), &doc, now).await?;
        } else {
            tx.update_doc(&doc).await?;
        }

        if public_changed {
            tx.set_uploads_public(doc.id, doc.public).await?;
        }
        if content_changed {
            revisions::append(tx.as_mut(), &doc, Some(user_id), now).await?;
        }
        let view = load_view(tx.as_mut(), doc, Visibility::All).await?;
        tx.commit().await?;

        info!(
            doc_id = view.doc.id,
            urlpath = %view.doc.urlpath,
            descendants = moved.len(),
            user = actor.name(),
            "Document updated"
        );

        moved.insert(0, view.doc.clone());
        self.reindex(&moved).await;
        Ok(view)
    }

    /// Swaps a document with its neighbour in display order.
    pub async fn move_doc(
        &self,
        actor: &Actor,
        id: i64,
        direction: MoveDirection,
    ) -> Result<(), AppError> {
        let mut tx = self.store.begin().await?;
        let doc = tx.get_doc(id).await?.ok_or(AppError::NotFound)?;
        let Some(parent_id) = doc.parent_id else {
            return Err(AppError::ForbiddenRootMove);
        };
        actor.require_editor()?;

        let siblings = tx.list_children(&[parent_id], false).await?;
        let ids: Vec<i64> = siblings.iter().map(|s| s.id).collect();
        let plan = ordering::plan_move(&ids, doc.id, direction).ok_or_else(|| {
            AppError::Corrupted(format!("document {id} is missing from its sibling list"))
        })?;

        let changed: Vec<(i64, i32)> = plan
            .into_iter()
            .filter(|(sibling_id, order)| {
                siblings
                    .iter()
                    .any(|s| s.id == *sibling_id && s.order != *order)
            })
            .collect();
        tx.set_orders(&changed).await?;
        tx.commit().await?;

        info!(doc_id = id, ?direction, user = actor.name(), "Document moved");
        Ok(())
    }

    /// Deletes a document and its whole subtree.
    pub async fn delete(&self, actor: &Actor, id: i64) -> Result<(), AppError> {
        let mut tx = self.store.begin().await?;
        let doc = tx.get_doc(id).await?.ok_or(AppError::NotFound)?;
        if doc.is_root() {
            return Err(AppError::ForbiddenRootDelete);
        }
        actor.require_editor()?;

        let ids = urlpath::subtree_ids(tx.as_mut(), doc.id).await?;
        tx.detach_uploads(&ids).await?;
        let deleted = tx.delete_docs(&ids).await?;
        tx.commit().await?;

        info!(doc_id = id, urlpath = %doc.urlpath, deleted, user = actor.name(), "Document deleted");

        if self.index.enabled() {
            if let Err(err) = self.index.delete_documents(&ids).await {
                warn!(doc_id = id, error = %err, "Failed to remove documents from search index");
            }
        }
        Ok(())
    }

    /// Makes a past revision current again, recording the restore as a new
    /// revision.
    pub async fn restore(
        &self,
        actor: &Actor,
        id: i64,
        revision_id: i64,
    ) -> Result<Doc, AppError> {
        let mut tx = self.store.begin().await?;
        let mut doc = tx.get_doc(id).await?.ok_or(AppError::NotFound)?;
        let user_id = actor.require_editor()?;
        let revision = tx
            .get_revision(doc.id, revision_id)
            .await?
            .ok_or(AppError::RevisionNotFound)?;

        // The table of contents follows the HTML that will be served.
        if revision.html.is_empty() {
            let rendered = content::render(&revision.markdown);
            doc.html = rendered.html;
            doc.metadata = rendered.metadata;
        } else {
            doc.metadata = content::table_of_contents(&revision.html);
            doc.html = revision.html;
        }
        doc.markdown = revision.markdown;
        doc.updated_by_id = Some(user_id);
        doc.updated_at = db::now();

        tx.update_doc(&doc).await?;
        revisions::append(tx.as_mut(), &doc, Some(user_id), doc.updated_at).await?;
        tx.commit().await?;

        info!(doc_id = id, revision_id, user = actor.name(), "Document restored");
        self.reindex(std::slice::from_ref(&doc)).await;
        Ok(doc)
    }

    pub async fn get(&self, id: i64, visibility: Visibility) -> Result<DocView, AppError> {
        let mut tx = self.store.begin().await?;
        let doc = tx.get_doc(id).await?.ok_or(AppError::NotFound)?;
        view(tx.as_mut(), doc, visibility).await
    }

    /// Looks a document up by urlpath; the leading `/` is optional.
    pub async fn get_by_path(&self, path: &str, visibility: Visibility) -> Result<DocView, AppError> {
        let mut tx = self.store.begin().await?;
        let doc = tx
            .get_doc_by_urlpath(&urlpath::normalize_lookup(path))
            .await?
            .ok_or(AppError::NotFound)?;
        view(tx.as_mut(), doc, visibility).await
    }

    /// A document reached through a share link: shown whatever its own
    /// visibility, with only its public children.
    pub async fn get_shared(&self, id: i64) -> Result<DocView, AppError> {
        let mut tx = self.store.begin().await?;
        let doc = tx.get_doc(id).await?.ok_or(AppError::NotFound)?;
        load_view(tx.as_mut(), doc, Visibility::PublicOnly).await
    }

    /// The tree below the root, `depth` levels deep.
    pub async fn outline(&self, depth: u32, visibility: Visibility) -> Result<DocTreeNode, AppError> {
        let mut tx = self.store.begin().await?;
        let root = tx
            .get_root()
            .await?
            .ok_or_else(|| AppError::Corrupted("no root document".to_string()))?;

        let levels = (depth as usize).min(MAX_TREE_DEPTH);
        let mut layers: Vec<Vec<Doc>> = Vec::with_capacity(levels);
        let mut frontier = vec![root.id];
        for _ in 0..levels {
            if frontier.is_empty() {
                break;
            }
            let level = tx.list_children(&frontier, visibility.public_only()).await?;
            frontier = level.iter().map(|d| d.id).collect();
            layers.push(level);
        }

        Ok(assemble_outline(&root, &layers))
    }

    /// Admin-style listing of every document, in display order.
    pub async fn list(&self, pagination: PaginationParams) -> Result<Paginated<Doc>, AppError> {
        let mut tx = self.store.begin().await?;
        let (items, total) = tx.list_docs(pagination.offset(), pagination.limit()).await?;
        Ok(Paginated {
            items,
            total,
            page: pagination.page,
            size: pagination.size,
        })
    }

    pub async fn revisions(
        &self,
        actor: &Actor,
        id: i64,
        pagination: PaginationParams,
    ) -> Result<Paginated<RevisionResponse>, AppError> {
        let mut tx = self.store.begin().await?;
        tx.get_doc(id).await?.ok_or(AppError::NotFound)?;
        actor.require_editor()?;
        revisions::list_by_doc(tx.as_mut(), id, pagination).await
    }

    /// Plain markdown export: title, links to visible children, then source.
    /// A trailing `.md` on the path is ignored.
    pub async fn markdown(&self, path: &str, visibility: Visibility) -> Result<String, AppError> {
        let path = path.strip_suffix(".md").unwrap_or(path);
        let DocView { doc, children, .. } = self.get_by_path(path, visibility).await?;

        let mut out = format!("# {}\n", doc.title);
        if !children.is_empty() {
            out.push('\n');
            for child in &children {
                out.push_str(&format!("- [{}]({})\n", child.title, child.urlpath));
            }
        }
        out.push('\n');
        out.push_str(&doc.markdown);
        Ok(out)
    }

    pub async fn public_docs(&self) -> Result<Vec<Doc>, AppError> {
        let mut tx = self.store.begin().await?;
        tx.list_public_docs().await
    }

    /// Best-effort; the mutation has already been committed.
    async fn reindex(&self, docs: &[Doc]) {
        if !self.index.enabled() || docs.is_empty() {
            return;
        }
        if let Err(err) = self.index.index_documents(docs).await {
            warn!(
                doc_id = docs[0].id,
                count = docs.len(),
                error = %err,
                "Failed to update search index"
            );
        }
    }
}

async fn next_child_order(tx: &mut dyn Transaction, parent_id: i64) -> Result<i32, AppError> {
    Ok(tx.max_child_order(parent_id).await?.map_or(0, |max| max + 1))
}

async fn view(
    tx: &mut dyn Transaction,
    doc: Doc,
    visibility: Visibility,
) -> Result<DocView, AppError> {
    if !visibility.allows(&doc) {
        return Err(AppError::NotFound);
    }
    load_view(tx, doc, visibility).await
}

async fn load_view(
    tx: &mut dyn Transaction,
    doc: Doc,
    children_visibility: Visibility,
) -> Result<DocView, AppError> {
    let parents = urlpath::ancestors(tx, &doc).await?;
    let children = tx
        .list_children(&[doc.id], children_visibility.public_only())
        .await?;
    Ok(DocView {
        doc,
        parents,
        children,
    })
}

/// Builds the nested outline from level-by-level child lists, each ordered
/// by parent and then display order.
fn assemble_outline(root: &Doc, layers: &[Vec<Doc>]) -> DocTreeNode {
    let mut by_parent: HashMap<i64, Vec<&Doc>> = HashMap::new();
    for doc in layers.iter().flatten() {
        if let Some(parent_id) = doc.parent_id {
            by_parent.entry(parent_id).or_default().push(doc);
        }
    }

    fn build(doc: &Doc, by_parent: &HashMap<i64, Vec<&Doc>>) -> DocTreeNode {
        DocTreeNode {
            id: doc.id,
            title: doc.title.clone(),
            urlpath: doc.urlpath.clone(),
            public: doc.public,
            children: by_parent
                .get(&doc.id)
                .map(|kids| kids.iter().map(|kid| build(kid, by_parent)).collect())
                .unwrap_or_default(),
        }
    }

    build(root, &by_parent)
}
