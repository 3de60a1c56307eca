// security/src/middleware.rs
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::debug;
use models::medical::Identity;
use serde_json::json;

use crate::roles::RolesConfig;
use crate::{validate_jwt_token, AuthError};

/// What the extractor needs from application state.
#[derive(Clone)]
pub struct AuthState {
    pub secret: Arc<Vec<u8>>,
    pub roles: Arc<RolesConfig>,
}

impl AuthState {
    pub fn new(secret: impl Into<Vec<u8>>, roles: RolesConfig) -> Self {
        AuthState { secret: Arc::new(secret.into()), roles: Arc::new(roles) }
    }
}

/// The caller's identity, taken from a valid `Authorization: Bearer` header.
#[derive(Debug, Clone, PartialEq)]
pub struct Authenticated(pub Identity);

impl Authenticated {
    pub fn identity(&self) -> &Identity {
        &self.0
    }

    /// Route-level role check.
    pub fn require(&self, roles: &RolesConfig, permission: &str) -> Result<(), AuthError> {
        if roles.has_permission(self.0.role, permission) {
            Ok(())
        } else {
            debug!("Role {} lacks {}", self.0.role, permission);
            Err(AuthError::PermissionDenied(permission.to_string()))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthState::from_ref(state);
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;
        let identity = validate_jwt_token(token, &auth.secret)?;
        Ok(Authenticated(identity))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AuthError::JwtError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::MissingToken | AuthError::InvalidToken(_) | AuthError::Expired => StatusCode::UNAUTHORIZED,
        };
        let body = Json(json!({
            "status": "error",
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
