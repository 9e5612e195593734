use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Cannot move or rename the home page")]
    ForbiddenRootMutation,

    #[error("Cannot move the home page")]
    ForbiddenRootMove,

    #[error("Cannot delete the home page")]
    ForbiddenRootDelete,

    #[error("Document not found")]
    NotFound,

    #[error("Revision not found")]
    RevisionNotFound,

    #[error("Parent document not found")]
    ParentNotFound,

    #[error("Invalid URL slug: {0}")]
    InvalidSlug(String),

    #[error("A sibling document with slug '{0}' already exists")]
    DuplicateSlug(String),

    #[error("{0}")]
    CircularReference(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Gone(&'static str),

    #[error("Search functionality is disabled")]
    SearchDisabled,

    #[error("Document tree is inconsistent: {0}")]
    Corrupted(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden
            | AppError::ForbiddenRootMutation
            | AppError::ForbiddenRootMove
            | AppError::ForbiddenRootDelete => StatusCode::FORBIDDEN,
            AppError::NotFound | AppError::RevisionNotFound => StatusCode::NOT_FOUND,
            AppError::ParentNotFound
            | AppError::InvalidSlug(_)
            | AppError::DuplicateSlug(_)
            | AppError::CircularReference(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Gone(_) => StatusCode::GONE,
            AppError::SearchDisabled => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Corrupted(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "Internal error".to_string()
            }
            AppError::Corrupted(detail) => {
                tracing::error!("Tree consistency error: {}", detail);
                "Internal error".to_string()
            }
            AppError::Validation(msg) | AppError::Conflict(msg) => msg.clone(),
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
