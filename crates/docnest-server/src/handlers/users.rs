use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use docnest_shared::{
    api::{
        ChangePasswordRequest, CreateUserRequest, Paginated, PaginationParams, UpdateUserRequest,
    },
    Role, User,
};

use crate::auth::{hash_password, verify_password, Actor};
use crate::config::AdminBootstrap;
use crate::db::{self, NewUser, Store};
use crate::error::AppError;
use crate::routes::AppState;

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=50;
const MIN_PASSWORD_LEN: usize = 8;

fn validate_username(username: &str) -> Result<(), AppError> {
    if !USERNAME_LEN.contains(&username.chars().count()) {
        return Err(AppError::Validation(
            "Username must be between 3 and 50 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_credentials(username: &str, password: &str) -> Result<(), AppError> {
    validate_username(username)?;
    validate_password(password)
}

/// Admins may act on any account; everyone else only on their own.
fn require_self_or_admin(actor: &Actor, user_id: i64) -> Result<(), AppError> {
    if actor.require_user()? == user_id || actor.can_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

async fn insert_user(
    store: &dyn Store,
    username: &str,
    password: &str,
    role: Role,
) -> Result<User, AppError> {
    validate_credentials(username, password)?;
    let password_hash = hash_password(password)?;

    let mut tx = store.begin().await?;
    let user = tx
        .insert_user(NewUser {
            username: username.to_string(),
            password_hash,
            role,
            now: db::now(),
        })
        .await?;
    tx.commit().await?;
    Ok(user)
}

/// Creates the configured admin account on first start.
pub async fn ensure_admin(store: &dyn Store, admin: &AdminBootstrap) -> Result<(), AppError> {
    let mut tx = store.begin().await?;
    let exists = tx.find_user_credentials(&admin.username).await?.is_some();
    drop(tx);

    if !exists {
        let user = insert_user(store, &admin.username, &admin.password, Role::Admin).await?;
        tracing::info!(user_id = user.id, username = %user.username, "Bootstrapped admin user");
    }
    Ok(())
}

/// POST /api/v1/users
pub async fn create_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    actor.require_admin()?;

    let user = insert_user(state.store.as_ref(), &req.username, &req.password, req.role).await?;
    tracing::info!(
        user_id = user.id,
        username = %user.username,
        created_by = actor.name(),
        "User created"
    );

    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/v1/users
pub async fn list_users(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<Paginated<User>>, AppError> {
    actor.require_user()?;

    let mut tx = state.store.begin().await?;
    let (items, total) = tx
        .list_users(pagination.offset(), pagination.limit())
        .await?;

    Ok(Json(Paginated {
        items,
        total,
        page: pagination.page,
        size: pagination.size,
    }))
}

/// GET /api/v1/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<i64>,
) -> Result<Json<User>, AppError> {
    actor.require_user()?;

    let mut tx = state.store.begin().await?;
    let user = tx.get_user(user_id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

/// PUT /api/v1/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let mut tx = state.store.begin().await?;
    let mut user = tx.get_user(user_id).await?.ok_or(AppError::NotFound)?;
    require_self_or_admin(&actor, user.id)?;

    if let Some(username) = req.username {
        validate_username(&username)?;
        user.username = username;
    }
    if let Some(role) = req.role {
        if !actor.can_admin() {
            return Err(AppError::Forbidden);
        }
        user.role = role;
    }
    user.updated_at = db::now();

    tx.update_user(&user).await?;
    tx.commit().await?;

    tracing::info!(user_id, username = %user.username, updated_by = actor.name(), "User updated");

    Ok(Json(user))
}

/// POST /api/v1/users/:id/change-password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<i64>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    let mut tx = state.store.begin().await?;
    let user = tx.get_user(user_id).await?.ok_or(AppError::NotFound)?;
    require_self_or_admin(&actor, user.id)?;
    validate_password(&req.new_password)?;

    let admin_reset = req.old_password.is_empty() && actor.can_admin();
    if !admin_reset {
        let credentials = tx
            .find_user_credentials(&user.username)
            .await?
            .ok_or(AppError::NotFound)?;
        if !verify_password(&req.old_password, &credentials.password_hash)? {
            return Err(AppError::Validation("Old password is incorrect".to_string()));
        }
    }

    let password_hash = hash_password(&req.new_password)?;
    tx.set_password_hash(user.id, &password_hash, db::now())
        .await?;
    tx.commit().await?;

    tracing::info!(user_id, changed_by = actor.name(), "Password changed");

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/users/:id
///
/// Content the user authored stays; its author reference is cleared.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    actor.require_admin()?;

    let mut tx = state.store.begin().await?;
    if !tx.delete_user(user_id).await? {
        return Err(AppError::NotFound);
    }
    tx.commit().await?;

    tracing::info!(user_id, deleted_by = actor.name(), "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_rules() {
        assert!(validate_credentials("ada", "longenough").is_ok());
        assert!(validate_credentials("ab", "longenough").is_err());
        assert!(validate_credentials("ada", "short").is_err());
    }

    #[test]
    fn only_admins_act_on_other_accounts() {
        let viewer = Actor::user(1, "ada", Role::Viewer);
        let admin = Actor::user(2, "root", Role::Admin);

        assert!(require_self_or_admin(&viewer, 1).is_ok());
        assert!(matches!(
            require_self_or_admin(&viewer, 2),
            Err(AppError::Forbidden)
        ));
        assert!(require_self_or_admin(&admin, 1).is_ok());
        assert!(matches!(
            require_self_or_admin(&Actor::anonymous(), 1),
            Err(AppError::Unauthorized)
        ));
    }
}
