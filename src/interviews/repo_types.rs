use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// A user's standing in one interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Interviewer,
    Interviewee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "question_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Text,
    File,
    Radio,
    Checkbox,
}

impl QuestionType {
    pub fn is_choice(self) -> bool {
        matches!(self, QuestionType::Radio | QuestionType::Checkbox)
    }
}

impl FromStr for QuestionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(QuestionType::Text),
            "file" => Ok(QuestionType::File),
            "radio" => Ok(QuestionType::Radio),
            "checkbox" => Ok(QuestionType::Checkbox),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Interview {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One user's relationship to one interview; unique per (user_id, interview_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub role: Role,
    pub user_id: i64,
    pub interview_id: i64,
    pub email: String,
    pub published: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub values: Vec<String>,
    pub limit: Option<i32>,
    pub interview_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// What the blob uploader hands back for a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub name: String,
    pub url: String,
    pub size: i64,
    pub mime_type: String,
}

/// Unique per (user_id, question_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: i64,
    pub text: String,
    pub values: Vec<String>,
    pub file: Option<FileAttachment>,
    pub user_id: i64,
    pub question_id: i64,
    pub interview_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Database shape of [`Answer`]; the file lives in a JSONB column.
#[derive(Debug, FromRow)]
pub struct AnswerRow {
    pub id: i64,
    pub text: String,
    pub values: Vec<String>,
    pub file: Option<sqlx::types::Json<FileAttachment>>,
    pub user_id: i64,
    pub question_id: i64,
    pub interview_id: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<AnswerRow> for Answer {
    fn from(r: AnswerRow) -> Self {
        Self {
            id: r.id,
            text: r.text,
            values: r.values,
            file: r.file.map(|f| f.0),
            user_id: r.user_id,
            question_id: r.question_id,
            interview_id: r.interview_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Unique per (answer_id, created_user_id). `user_id` is the interviewee being scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub id: i64,
    pub value: f64,
    pub interview_id: i64,
    pub question_id: i64,
    pub answer_id: i64,
    pub user_id: i64,
    pub created_user_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
