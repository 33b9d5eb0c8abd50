//! Persistence contract for accounts and interview records.
//!
//! Uniqueness on (user, interview) sessions, (user, question) answers and
//! (answer, scorer) scores is enforced here, not by callers. The `upsert_*`
//! methods are create-or-update on those keys and return the stored row,
//! which may carry a different id than the candidate when another writer won.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::auth::repo_types::User;
use crate::interviews::repo_types::{Answer, FileAttachment, Interview, Question, Score, Session};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; carries the key/constraint name.
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("{0} not found")]
    Missing(&'static str),
    /// The owning session is published (or gone); its answers no longer change.
    #[error("session is locked")]
    Locked,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::Missing("row"),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Duplicate(
                db_err.constraint().unwrap_or("unique").to_string(),
            ),
            other => StoreError::Backend(anyhow::Error::new(other)),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn insert_interview(&self, interview: &Interview) -> StoreResult<()>;
    async fn delete_interview(&self, id: i64) -> StoreResult<()>;
    async fn find_interview(&self, id: i64) -> StoreResult<Option<Interview>>;
    /// Interviews the user holds any session in, newest first.
    async fn list_interviews_for_user(&self, user_id: i64) -> StoreResult<Vec<Interview>>;

    /// Plain insert; a second session for the same (user, interview) is `Duplicate`.
    async fn insert_session(&self, session: &Session) -> StoreResult<()>;
    /// Insert, or overwrite role and email of the existing (user, interview) session.
    async fn upsert_session_role(&self, session: &Session) -> StoreResult<Session>;
    async fn find_session(&self, interview_id: i64, user_id: i64) -> StoreResult<Option<Session>>;
    async fn find_session_by_id(&self, id: i64) -> StoreResult<Option<Session>>;
    async fn list_sessions(&self, interview_id: i64) -> StoreResult<Vec<Session>>;
    async fn list_sessions_for_user(&self, user_id: i64) -> StoreResult<Vec<Session>>;
    /// Sets `published`; keeps the first `published_at` if already published.
    async fn publish_session(&self, id: i64, at: OffsetDateTime) -> StoreResult<Session>;

    async fn insert_question(&self, question: &Question) -> StoreResult<()>;
    async fn find_question(&self, id: i64) -> StoreResult<Option<Question>>;
    /// Oldest first.
    async fn list_questions(&self, interview_id: i64) -> StoreResult<Vec<Question>>;

    async fn find_answer(&self, id: i64) -> StoreResult<Option<Answer>>;
    async fn find_answer_by_key(&self, user_id: i64, question_id: i64)
        -> StoreResult<Option<Answer>>;
    /// Keyed by (user_id, question_id); updates text and values, never the file.
    /// Fails with `Locked` unless the owner's session exists and is unpublished,
    /// checked in the same write.
    async fn upsert_answer(&self, answer: &Answer) -> StoreResult<Answer>;
    /// Same publish rule as `upsert_answer`.
    async fn set_answer_file(
        &self,
        id: i64,
        file: Option<&FileAttachment>,
        at: OffsetDateTime,
    ) -> StoreResult<Answer>;
    async fn list_answers(&self, interview_id: i64, user_id: i64) -> StoreResult<Vec<Answer>>;

    async fn find_score_by_key(
        &self,
        answer_id: i64,
        created_user_id: i64,
    ) -> StoreResult<Option<Score>>;
    /// Keyed by (answer_id, created_user_id); updates the value.
    async fn upsert_score(&self, score: &Score) -> StoreResult<Score>;
    async fn list_scores(&self, interview_id: i64) -> StoreResult<Vec<Score>>;
}
