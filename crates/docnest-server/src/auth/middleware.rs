use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use docnest_shared::Role;

use crate::{error::AppError, routes::AppState};

use super::jwt::verify_access_token;

/// The principal behind a request. Anonymous callers have no user id and
/// no role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub role: Option<Role>,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(id: i64, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: Some(id),
            username: Some(username.into()),
            role: Some(role),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn can_edit(&self) -> bool {
        self.role.is_some_and(|r| r.can_edit())
    }

    pub fn can_admin(&self) -> bool {
        self.role.is_some_and(|r| r.can_admin())
    }

    /// Display name for log lines.
    pub fn name(&self) -> &str {
        self.username.as_deref().unwrap_or("anonymous")
    }

    pub fn require_user(&self) -> Result<i64, AppError> {
        self.user_id.ok_or(AppError::Unauthorized)
    }

    pub fn require_editor(&self) -> Result<i64, AppError> {
        let id = self.require_user()?;
        if self.can_edit() {
            Ok(id)
        } else {
            Err(AppError::Forbidden)
        }
    }

    pub fn require_admin(&self) -> Result<i64, AppError> {
        let id = self.require_user()?;
        if self.can_admin() {
            Ok(id)
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// Attaches an [`Actor`] to every request. A missing header means an
/// anonymous caller; a header that does not carry a valid token is rejected.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let actor = match request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
    {
        None => Actor::anonymous(),
        Some(auth_header) => {
            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or(AppError::Unauthorized)?;
            let claims = verify_access_token(token, &state.config.jwt_secret)?;
            Actor::user(claims.sub, claims.username, claims.role)
        }
    };

    request.extensions_mut().insert(actor);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_gate_actions() {
        assert!(Actor::user(1, "a", Role::Admin).require_admin().is_ok());
        assert!(Actor::user(2, "e", Role::Editor).require_editor().is_ok());
        assert!(matches!(
            Actor::user(3, "v", Role::Viewer).require_editor(),
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            Actor::anonymous().require_editor(),
            Err(AppError::Unauthorized)
        ));
    }
}
