use axum::{extract::State, Extension, Json};
use docnest_shared::{
    api::{AuthResponse, LoginRequest},
    User,
};

use crate::auth::{create_access_token, verify_password, Actor};
use crate::error::AppError;
use crate::routes::AppState;

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let mut tx = state.store.begin().await?;
    let credentials = tx
        .find_user_credentials(&req.username)
        .await?
        .ok_or(AppError::Unauthorized)?;
    drop(tx);

    if !verify_password(&req.password, &credentials.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let user = credentials.user;
    let access_token = create_access_token(
        user.id,
        &user.username,
        user.role,
        &state.config.jwt_secret,
        state.config.jwt_expires_in,
    )?;

    tracing::info!(user_id = user.id, username = %user.username, "User logged in");

    Ok(Json(AuthResponse {
        access_token,
        user_id: user.id,
        role: user.role,
    }))
}

/// GET /api/v1/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<User>, AppError> {
    let user_id = actor.require_user()?;
    let mut tx = state.store.begin().await?;
    let user = tx.get_user(user_id).await?.ok_or(AppError::Unauthorized)?;
    Ok(Json(user))
}
