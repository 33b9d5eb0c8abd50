pub mod dto;
pub mod handlers;
pub mod repo_types;
mod roles;
pub mod services;
pub mod validators;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::interview_routes())
        .merge(handlers::answer_routes())
}
