use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::jwt::JwtKeys;
use crate::error::{messages, AppError};
use crate::state::AppState;

/// The authenticated user behind a request, taken from the bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::unauthorized(messages::MISSING_TOKEN))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| AppError::unauthorized(messages::MISSING_TOKEN))?;

        let claims = JwtKeys::from_ref(state).verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            AppError::unauthorized(messages::INVALID_TOKEN)
        })?;

        Ok(Caller {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}
