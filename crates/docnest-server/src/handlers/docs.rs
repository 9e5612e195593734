use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use docnest_shared::api::{
    CreateDocRequest, DocByPathParams, DocInfo, DocResponse, DocTreeNode, GetDocParams,
    ListDocsParams, MoveDocParams, OutlineParams, Paginated, PaginationParams,
    RestoreRevisionParams, RevisionResponse, UpdateDocRequest,
};
use chrono::{DateTime, Utc};

use crate::auth::Actor;
use crate::error::AppError;
use crate::routes::AppState;
use crate::tree::{DocView, Visibility};

/// Shapes a view for the wire. Markdown is only sent on request and the
/// last editor is hidden from anonymous callers.
pub(crate) fn doc_response(view: DocView, include_source: bool, actor: &Actor) -> DocResponse {
    let DocView {
        doc,
        parents,
        children,
    } = view;

    let mut response = DocResponse::from(doc);
    if !include_source {
        response.markdown.clear();
    }
    if !actor.is_authenticated() {
        response.updated_by_id = None;
    }
    response.parents = parents.iter().map(DocInfo::from).collect();
    response.children = children.iter().map(DocInfo::from).collect();
    response
}

fn conditional(
    view: DocView,
    timestamp: Option<DateTime<Utc>>,
    include_source: bool,
    actor: &Actor,
) -> Response {
    if timestamp == Some(view.doc.updated_at) {
        return StatusCode::NOT_MODIFIED.into_response();
    }
    Json(doc_response(view, include_source, actor)).into_response()
}

/// GET /api/v1/docs
pub async fn list_docs(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(pagination): Query<PaginationParams>,
    Query(params): Query<ListDocsParams>,
) -> Result<Json<Paginated<DocResponse>>, AppError> {
    actor.require_user()?;

    let page = state.tree.list(pagination).await?;
    let items = page
        .items
        .into_iter()
        .map(|doc| {
            let mut response = DocResponse::from(doc);
            if !params.include_content {
                response.markdown.clear();
                response.html.clear();
            }
            response
        })
        .collect();

    Ok(Json(Paginated {
        items,
        total: page.total,
        page: page.page,
        size: page.size,
    }))
}

/// POST /api/v1/docs
pub async fn create_doc(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateDocRequest>,
) -> Result<(StatusCode, Json<DocResponse>), AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Document title is required".to_string()));
    }

    let view = state.tree.create(&actor, req).await?;

    Ok((StatusCode::CREATED, Json(doc_response(view, true, &actor))))
}

/// GET /api/v1/docs/outline
pub async fn get_outline(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<OutlineParams>,
) -> Result<Json<DocTreeNode>, AppError> {
    let outline = state
        .tree
        .outline(params.depth, Visibility::for_actor(&actor))
        .await?;
    Ok(Json(outline))
}

/// GET /api/v1/docs/by_path
pub async fn get_doc_by_path(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<DocByPathParams>,
) -> Result<Response, AppError> {
    let view = state
        .tree
        .get_by_path(&params.path, Visibility::for_actor(&actor))
        .await?;
    Ok(conditional(view, params.timestamp, params.include_source, &actor))
}

/// GET /api/v1/docs/:id
pub async fn get_doc(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(doc_id): Path<i64>,
    Query(params): Query<GetDocParams>,
) -> Result<Response, AppError> {
    let view = state
        .tree
        .get(doc_id, Visibility::for_actor(&actor))
        .await?;
    Ok(conditional(view, params.timestamp, params.include_source, &actor))
}

/// GET /api/v1/docs/markdown/*path
pub async fn get_doc_markdown(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let body = state
        .tree
        .markdown(&path, Visibility::for_actor(&actor))
        .await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

/// PUT/PATCH /api/v1/docs/:id
pub async fn update_doc(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(doc_id): Path<i64>,
    Json(req): Json<UpdateDocRequest>,
) -> Result<Json<DocResponse>, AppError> {
    if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(AppError::Validation("Document title cannot be empty".to_string()));
    }

    let view = state.tree.update(&actor, doc_id, req).await?;

    Ok(Json(doc_response(view, true, &actor)))
}

/// POST /api/v1/docs/:id/move
pub async fn move_doc(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(doc_id): Path<i64>,
    Query(params): Query<MoveDocParams>,
) -> Result<StatusCode, AppError> {
    state.tree.move_doc(&actor, doc_id, params.direction).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/docs/:id/restore_revision
pub async fn restore_revision(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(doc_id): Path<i64>,
    Query(params): Query<RestoreRevisionParams>,
) -> Result<StatusCode, AppError> {
    state
        .tree
        .restore(&actor, doc_id, params.revision_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/docs/:id/revisions
pub async fn list_revisions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(doc_id): Path<i64>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Paginated<RevisionResponse>>, AppError> {
    actor.require_user()?;
    let page = state.tree.revisions(&actor, doc_id, pagination).await?;
    Ok(Json(page))
}

/// DELETE /api/v1/docs/:id
pub async fn delete_doc(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(doc_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.tree.delete(&actor, doc_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
