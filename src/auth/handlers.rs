use axum::{extract::State, routing::post, Json, Router};
use tracing::instrument;

use super::dto::{AuthResponse, Credentials};
use super::services;
use crate::error::AppError;
use crate::state::AppState;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, access_token) = services::register(&state, &payload.email, &payload.password).await?;
    Ok(Json(AuthResponse {
        access_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> Result<Json<AuthResponse>, AppError> {
    let (user, access_token) = services::login(&state, &payload.email, &payload.password).await?;
    Ok(Json(AuthResponse {
        access_token,
        user: user.into(),
    }))
}
