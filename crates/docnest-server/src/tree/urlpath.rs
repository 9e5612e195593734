//! Materialized paths: computing a node's urlpath from its slug chain and
//! rewriting a subtree after a rename or reparent.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use docnest_shared::Doc;

use crate::db::Transaction;
use crate::error::AppError;

/// Upper bound on parent hops. Longer chains only exist in a corrupted table.
pub const MAX_TREE_DEPTH: usize = 256;

pub const ROOT_URLPATH: &str = "/";

/// Joins a slug chain (root excluded) into an absolute urlpath.
pub fn compute_urlpath<S: AsRef<str>>(slugs: &[S]) -> String {
    let mut path = String::new();
    for slug in slugs {
        path.push('/');
        path.push_str(slug.as_ref());
    }
    if path.is_empty() {
        path.push_str(ROOT_URLPATH);
    }
    path
}

pub fn child_urlpath(parent_urlpath: &str, slug: &str) -> String {
    if parent_urlpath == ROOT_URLPATH {
        format!("/{slug}")
    } else {
        format!("{parent_urlpath}/{slug}")
    }
}

/// Inverse of [`compute_urlpath`].
pub fn segments(urlpath: &str) -> Vec<&str> {
    urlpath.split('/').filter(|s| !s.is_empty()).collect()
}

/// Lookup paths may arrive without the leading slash.
pub fn normalize_lookup(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Number of ancestors of the document at `urlpath`; the root is at depth 0.
pub fn depth(urlpath: &str) -> usize {
    segments(urlpath).len()
}

/// Rejects writes that would place a document at or past `MAX_TREE_DEPTH`,
/// where reads would report the tree as corrupted.
pub fn ensure_depth(depth: usize) -> Result<(), AppError> {
    if depth >= MAX_TREE_DEPTH {
        return Err(AppError::Validation(format!(
            "Documents cannot be nested more than {} levels deep",
            MAX_TREE_DEPTH - 1
        )));
    }
    Ok(())
}

/// Ancestors of `doc`, nearest first, ending with the root.
pub async fn ancestors(tx: &mut dyn Transaction, doc: &Doc) -> Result<Vec<Doc>, AppError> {
    ancestors_of(tx, doc.id, doc.parent_id).await
}

/// Walks parent links starting at `parent_id`. `start_id` is the node the
/// walk is for; meeting it again means the table contains a cycle.
pub async fn ancestors_of(
    tx: &mut dyn Transaction,
    start_id: i64,
    parent_id: Option<i64>,
) -> Result<Vec<Doc>, AppError> {
    let mut chain = Vec::new();
    let mut next = parent_id;

    while let Some(id) = next {
        if chain.len() >= MAX_TREE_DEPTH {
            return Err(AppError::Corrupted(format!(
                "ancestor chain of document {start_id} exceeds {MAX_TREE_DEPTH} levels"
            )));
        }
        let parent = tx.get_doc(id).await?.ok_or_else(|| {
            AppError::Corrupted(format!("document {start_id} has a dangling ancestor {id}"))
        })?;
        next = parent.parent_id;
        chain.push(parent);
    }

    Ok(chain)
}

/// Recomputes `doc`'s urlpath from its current parent chain.
pub async fn materialize(tx: &mut dyn Transaction, doc: &Doc) -> Result<String, AppError> {
    if doc.is_root() {
        return Ok(ROOT_URLPATH.to_string());
    }
    let chain = ancestors(tx, doc).await?;
    let mut slugs: Vec<&str> = chain
        .iter()
        .rev()
        .filter(|d| !d.is_root())
        .map(|d| d.slug.as_str())
        .collect();
    slugs.push(&doc.slug);
    Ok(compute_urlpath(&slugs))
}

/// Rewrites the urlpath of every descendant of `doc` (whose own urlpath must
/// already be current), one tree level per query. Returns the descendants
/// as they now stand, in breadth-first order.
pub async fn cascade(
    tx: &mut dyn Transaction,
    doc: &Doc,
    now: DateTime<Utc>,
) -> Result<Vec<Doc>, AppError> {
    let mut paths: HashMap<i64, String> = HashMap::from([(doc.id, doc.urlpath.clone())]);
    let mut seen: HashSet<i64> = HashSet::from([doc.id]);
    let mut frontier = vec![doc.id];
    let mut touched = Vec::new();
    let mut depth = 0;

    while !frontier.is_empty() {
        depth += 1;
        if depth > MAX_TREE_DEPTH {
            return Err(AppError::Corrupted(format!(
                "subtree of document {} exceeds {MAX_TREE_DEPTH} levels",
                doc.id
            )));
        }

        let children = tx.list_children(&frontier, false).await?;
        let mut next = Vec::with_capacity(children.len());
        for mut child in children {
            if !seen.insert(child.id) {
                return Err(AppError::Corrupted(format!(
                    "document {} is reachable twice below {}",
                    child.id, doc.id
                )));
            }
            let Some(parent_id) = child.parent_id else {
                continue;
            };
            let Some(parent_path) = paths.get(&parent_id) else {
                continue;
            };
            let urlpath = child_urlpath(parent_path, &child.slug);
            if urlpath != child.urlpath {
                tx.set_urlpath(child.id, &urlpath, now).await?;
                child.urlpath = urlpath;
                child.updated_at = now;
            }
            paths.insert(child.id, child.urlpath.clone());
            next.push(child.id);
            touched.push(child);
        }
        frontier = next;
    }

    Ok(touched)
}

/// Ids of `doc` and all its descendants, breadth-first.
pub async fn subtree_ids(tx: &mut dyn Transaction, doc_id: i64) -> Result<Vec<i64>, AppError> {
    Ok(subtree_levels(tx, doc_id).await?.concat())
}

/// Levels below `doc`: 0 for a leaf.
pub async fn subtree_height(tx: &mut dyn Transaction, doc_id: i64) -> Result<usize, AppError> {
    Ok(subtree_levels(tx, doc_id).await?.len() - 1)
}

/// `doc` and its descendants grouped by level; the first level is `[doc_id]`.
async fn subtree_levels(
    tx: &mut dyn Transaction,
    doc_id: i64,
) -> Result<Vec<Vec<i64>>, AppError> {
    let mut seen: HashSet<i64> = HashSet::from([doc_id]);
    let mut levels = vec![vec![doc_id]];

    loop {
        let frontier = &levels[levels.len() - 1];
        let children = tx.list_children(frontier, false).await?;
        let next: Vec<i64> = children
            .into_iter()
            .map(|c| c.id)
            .filter(|id| seen.insert(*id))
            .collect();
        if next.is_empty() {
            return Ok(levels);
        }
        if levels.len() > MAX_TREE_DEPTH {
            return Err(AppError::Corrupted(format!(
                "subtree of document {doc_id} exceeds {MAX_TREE_DEPTH} levels"
            )));
        }
        levels.push(next);
    }
}
