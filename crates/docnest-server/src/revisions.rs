//! Append-only content history. Revisions are never edited or removed on
//! their own; they go away only together with their document.

use chrono::{DateTime, Utc};
use docnest_shared::{
    api::{Paginated, PaginationParams, RevisionResponse},
    Doc, Revision,
};

use crate::db::{NewRevision, RevisionEntry, Transaction};
use crate::error::AppError;

/// Snapshots the current content of `doc`.
pub async fn append(
    tx: &mut dyn Transaction,
    doc: &Doc,
    created_by_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Revision, AppError> {
    tx.insert_revision(NewRevision {
        doc_id: doc.id,
        markdown: doc.markdown.clone(),
        html: doc.html.clone(),
        created_by_id,
        now,
    })
    .await
}

/// Newest first.
pub async fn list_by_doc(
    tx: &mut dyn Transaction,
    doc_id: i64,
    pagination: PaginationParams,
) -> Result<Paginated<RevisionResponse>, AppError> {
    let (entries, total) = tx
        .list_revisions(doc_id, pagination.offset(), pagination.limit())
        .await?;

    Ok(Paginated {
        items: entries.into_iter().map(into_response).collect(),
        total,
        page: pagination.page,
        size: pagination.size,
    })
}

fn into_response(entry: RevisionEntry) -> RevisionResponse {
    let RevisionEntry {
        revision,
        created_by_username,
    } = entry;
    RevisionResponse {
        id: revision.id,
        doc_id: revision.doc_id,
        markdown: revision.markdown,
        html: revision.html,
        created_by_id: revision.created_by_id,
        created_by_username,
        created_at: revision.created_at,
    }
}
