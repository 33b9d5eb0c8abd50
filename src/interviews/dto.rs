use serde::{Deserialize, Deserializer, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::repo_types::{Answer, Interview, Question, Score, Session};

/// Request body for creating an interview.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInterviewRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "instant")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default, deserialize_with = "instant")]
    pub end_time: Option<OffsetDateTime>,
}

/// Epoch milliseconds or an RFC 3339 string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Instant {
    Millis(i64),
    Text(String),
}

fn instant<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Instant>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Instant::Millis(ms)) => OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
            .map(Some)
            .map_err(D::Error::custom),
        Some(Instant::Text(text)) => OffsetDateTime::parse(&text, &Rfc3339)
            .map(Some)
            .map_err(D::Error::custom),
    }
}

/// Interview fields after validation.
#[derive(Debug, Clone)]
pub struct NewInterview {
    pub title: String,
    pub description: Option<String>,
    pub start_time: OffsetDateTime,
    pub end_time: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub email: String,
}

/// Request body for a new question. Loosely typed so that shape problems come
/// back as field errors rather than a body rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CreateQuestionRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub values: Option<serde_json::Value>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitAnswerRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub values: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitScoreRequest {
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct InterviewWithSession {
    pub interview: Interview,
    pub session: Session,
}

#[derive(Debug, Serialize)]
pub struct InterviewList {
    pub interviews: Vec<Interview>,
    pub sessions: Vec<Session>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: Session,
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub sessions: Vec<Session>,
}

#[derive(Debug, Serialize)]
pub struct QuestionResponse {
    pub question: Question,
}

/// Questions of an interview plus the caller's own answers to them.
#[derive(Debug, Serialize)]
pub struct QuestionList {
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer: Answer,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub score: Score,
}

#[derive(Debug, Serialize)]
pub struct ScoreList {
    pub scores: Vec<Score>,
}
