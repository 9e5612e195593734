use axum::{extract::State, Extension, Json};
use docnest_shared::api::{SearchRequest, SearchResponse};

use crate::auth::Actor;
use crate::error::AppError;
use crate::indexing::search_documents;
use crate::routes::AppState;

/// POST /api/v1/docs/search
///
/// Anonymous callers only get public hits.
pub async fn search_docs(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = search_documents(
        state.index.as_ref(),
        &req.query,
        !actor.is_authenticated(),
    )
    .await?;
    Ok(Json(results))
}
