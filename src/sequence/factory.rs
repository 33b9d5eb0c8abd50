use std::sync::Arc;

use time::OffsetDateTime;
use tracing::warn;

use super::SequenceAllocator;
use crate::auth::repo_types::User;
use crate::error::AppError;
use crate::interviews::dto::NewInterview;
use crate::interviews::repo_types::{Answer, Interview, Question, Role, Score, Session};
use crate::interviews::validators::{AnswerDraft, QuestionDraft};

/// Every entity kind with its own id sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Interview,
    Session,
    Question,
    Answer,
    Score,
}

impl EntityKind {
    pub fn sequence_name(self) -> &'static str {
        match self {
            EntityKind::User => "User",
            EntityKind::Interview => "Interview",
            EntityKind::Session => "Session",
            EntityKind::Question => "Question",
            EntityKind::Answer => "Answer",
            EntityKind::Score => "Score",
        }
    }
}

/// Builds new records stamped with a freshly minted public id.
///
/// Records are returned, never saved: if the save fails the id is simply
/// skipped, it is not kept around for reuse.
#[derive(Clone)]
pub struct EntityFactory {
    sequences: Arc<dyn SequenceAllocator>,
}

impl EntityFactory {
    pub fn new(sequences: Arc<dyn SequenceAllocator>) -> Self {
        Self { sequences }
    }

    pub async fn mint(&self, kind: EntityKind) -> Result<i64, AppError> {
        let sequence = kind.sequence_name();
        self.sequences.next_value(sequence).await.map_err(|source| {
            warn!(error = %source, sequence, "sequence allocation failed");
            AppError::AllocationFailed {
                sequence: sequence.to_string(),
                source,
            }
        })
    }

    /// Existing id for an upsert target, or a new one when the key is unseen.
    async fn reuse_or_mint(&self, existing: Option<i64>, kind: EntityKind) -> Result<i64, AppError> {
        match existing {
            Some(id) => Ok(id),
            None => self.mint(kind).await,
        }
    }

    pub async fn user(&self, email: String, password_hash: String) -> Result<User, AppError> {
        Ok(User {
            id: self.mint(EntityKind::User).await?,
            email,
            password_hash,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    pub async fn interview(&self, draft: NewInterview) -> Result<Interview, AppError> {
        let now = OffsetDateTime::now_utc();
        Ok(Interview {
            id: self.mint(EntityKind::Interview).await?,
            title: draft.title,
            description: draft.description,
            start_time: draft.start_time,
            end_time: draft.end_time,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn session(
        &self,
        existing: Option<&Session>,
        role: Role,
        user_id: i64,
        interview_id: i64,
        email: &str,
    ) -> Result<Session, AppError> {
        let now = OffsetDateTime::now_utc();
        let id = self
            .reuse_or_mint(existing.map(|s| s.id), EntityKind::Session)
            .await?;
        Ok(Session {
            id,
            role,
            user_id,
            interview_id,
            email: email.to_string(),
            published: existing.map_or(false, |s| s.published),
            published_at: existing.and_then(|s| s.published_at),
            created_at: existing.map_or(now, |s| s.created_at),
            updated_at: now,
        })
    }

    pub async fn question(&self, draft: QuestionDraft, interview_id: i64) -> Result<Question, AppError> {
        let now = OffsetDateTime::now_utc();
        Ok(Question {
            id: self.mint(EntityKind::Question).await?,
            title: draft.title,
            description: draft.description,
            kind: draft.kind,
            values: draft.values,
            limit: draft.limit,
            interview_id,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn answer(
        &self,
        existing: Option<&Answer>,
        draft: AnswerDraft,
        user_id: i64,
        question: &Question,
    ) -> Result<Answer, AppError> {
        let now = OffsetDateTime::now_utc();
        let id = self
            .reuse_or_mint(existing.map(|a| a.id), EntityKind::Answer)
            .await?;
        Ok(Answer {
            id,
            text: draft.text,
            values: draft.values,
            file: existing.and_then(|a| a.file.clone()),
            user_id,
            question_id: question.id,
            interview_id: question.interview_id,
            created_at: existing.map_or(now, |a| a.created_at),
            updated_at: now,
        })
    }

    pub async fn score(
        &self,
        existing: Option<&Score>,
        value: f64,
        answer: &Answer,
        scorer_id: i64,
    ) -> Result<Score, AppError> {
        let now = OffsetDateTime::now_utc();
        let id = self
            .reuse_or_mint(existing.map(|s| s.id), EntityKind::Score)
            .await?;
        Ok(Score {
            id,
            value,
            interview_id: answer.interview_id,
            question_id: answer.question_id,
            answer_id: answer.id,
            user_id: answer.user_id,
            created_user_id: scorer_id,
            created_at: existing.map_or(now, |s| s.created_at),
            updated_at: now,
        })
    }
}
