use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::jwt::JwtKeys;
use super::password::{hash_password, verify_password};
use super::repo_types::User;
use crate::error::{messages, AppError, FieldError};
use crate::state::AppState;
use crate::store::StoreError;

pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_PASSWORD_CHARS: usize = 64;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_credentials(email: &str, password: &str) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if !is_valid_email(email) {
        errors.push(FieldError::new("email", messages::INVALID_EMAIL));
    }
    let len = password.chars().count();
    if !(MIN_PASSWORD_CHARS..=MAX_PASSWORD_CHARS).contains(&len) {
        errors.push(FieldError::new("password", messages::PASSWORD_LENGTH));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

fn internal(e: anyhow::Error) -> AppError {
    AppError::Storage(StoreError::Backend(e))
}

/// Creates an account and returns it with a fresh access token.
pub async fn register(state: &AppState, email: &str, password: &str) -> Result<(User, String), AppError> {
    let email = normalize_email(email);
    check_credentials(&email, password)?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::conflict("email", messages::EMAIL_TAKEN));
    }

    let hash = hash_password(password).map_err(internal)?;
    let user = state.factory.user(email, hash).await?;
    state.store.insert_user(&user).await.map_err(|e| match e {
        StoreError::Duplicate(_) => AppError::conflict("email", messages::EMAIL_TAKEN),
        other => other.into(),
    })?;

    let token = JwtKeys::from(&state.config.jwt)
        .sign(user.id, &user.email)
        .map_err(internal)?;
    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((user, token))
}

/// Checks credentials. Unknown email and wrong password are indistinguishable.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<(User, String), AppError> {
    let email = normalize_email(email);
    let rejected = || AppError::unauthorized(messages::INVALID_CREDENTIALS);

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(rejected());
    };
    if !verify_password(password, &user.password_hash).map_err(internal)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(rejected());
    }

    let token = JwtKeys::from(&state.config.jwt)
        .sign(user.id, &user.email)
        .map_err(internal)?;
    info!(user_id = user.id, "user logged in");
    Ok((user, token))
}
