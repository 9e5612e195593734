use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use docnest_shared::{
    api::{CreateShareLinkRequest, DocResponse, ShareLinkListParams},
    ShareLink,
};

use crate::auth::Actor;
use crate::db::{self, NewShareLink, Transaction};
use crate::error::AppError;
use crate::handlers::docs::doc_response;
use crate::routes::AppState;

const TOKEN_BYTES: usize = 32;

fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Admins see every link; editors only their own. Anything else is reported
/// as missing.
async fn visible_link(
    tx: &mut dyn Transaction,
    actor: &Actor,
    link_id: i64,
) -> Result<ShareLink, AppError> {
    let user_id = actor.require_editor()?;
    let link = tx
        .get_share_link(link_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !actor.can_admin() && link.created_by_id != Some(user_id) {
        return Err(AppError::NotFound);
    }
    Ok(link)
}

/// POST /api/v1/sharelinks
pub async fn create_sharelink(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateShareLinkRequest>,
) -> Result<(StatusCode, Json<ShareLink>), AppError> {
    let user_id = actor.require_editor()?;

    let mut tx = state.store.begin().await?;
    let doc = tx.get_doc(req.doc_id).await?.ok_or(AppError::NotFound)?;

    let now = db::now();
    let link = tx
        .insert_share_link(NewShareLink {
            token: generate_token(),
            doc_id: doc.id,
            created_by_id: Some(user_id),
            expires_at: req.expiration.expires_at(now),
            now,
        })
        .await?;
    tx.commit().await?;

    tracing::info!(link_id = link.id, doc_id = doc.id, user = actor.name(), "Share link created");

    Ok((StatusCode::CREATED, Json(link)))
}

/// GET /api/v1/sharelinks?doc_id=
pub async fn list_sharelinks(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ShareLinkListParams>,
) -> Result<Json<Vec<ShareLink>>, AppError> {
    let user_id = actor.require_editor()?;
    let created_by = if actor.can_admin() { None } else { Some(user_id) };

    let mut tx = state.store.begin().await?;
    let links = tx.list_share_links(params.doc_id, created_by).await?;
    Ok(Json(links))
}

/// GET /api/v1/sharelinks/:id
pub async fn get_sharelink(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(link_id): Path<i64>,
) -> Result<Json<ShareLink>, AppError> {
    let mut tx = state.store.begin().await?;
    let link = visible_link(tx.as_mut(), &actor, link_id).await?;
    Ok(Json(link))
}

/// DELETE /api/v1/sharelinks/:id
pub async fn delete_sharelink(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(link_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let mut tx = state.store.begin().await?;
    let link = visible_link(tx.as_mut(), &actor, link_id).await?;
    tx.delete_share_link(link.id).await?;
    tx.commit().await?;

    tracing::info!(link_id, doc_id = link.doc_id, user = actor.name(), "Share link deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/sharelinks/access/:token
///
/// Public. Returns the shared document with its public children only.
pub async fn access_shared_doc(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<DocResponse>, AppError> {
    let mut tx = state.store.begin().await?;
    let link = tx
        .get_share_link_by_token(&token)
        .await?
        .ok_or(AppError::NotFound)?;

    let now = db::now();
    if link.is_expired(now) {
        return Err(AppError::Gone("This share link has expired"));
    }
    let link = tx.record_share_access(link.id, now).await?;
    tx.commit().await?;

    let view = state.tree.get_shared(link.doc_id).await?;
    Ok(Json(doc_response(view, false, &Actor::anonymous())))
}
