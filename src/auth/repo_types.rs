use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,                      // minted from the "User" sequence
    pub email: String,                // unique, lowercased
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 hash, not exposed in JSON
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
