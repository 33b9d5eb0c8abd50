use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use tracing::{instrument, warn};

use super::dto::{
    AnswerResponse, CreateInterviewRequest, CreateQuestionRequest, InterviewList,
    InterviewWithSession, InviteRequest, QuestionList, QuestionResponse, ScoreList, ScoreResponse,
    SessionList, SessionResponse, SubmitAnswerRequest, SubmitScoreRequest,
};
use super::validators;
use crate::auth::Caller;
use crate::error::{messages, AppError, FieldError};
use crate::state::AppState;
use crate::storage;
use crate::store::StoreError;

pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn interview_routes() -> Router<AppState> {
    Router::new()
        .route("/interviews", post(create_interview).get(list_interviews))
        .route("/interviews/:id/join", put(join))
        .route("/interviews/:id/invite", post(invite))
        .route("/interviews/:id/sessions", get(list_sessions))
        .route("/interviews/:id/sessions/:session_id/publish", post(publish))
        .route("/interviews/:id/questions", post(create_question).get(list_questions))
        .route("/interviews/:id/scores", get(list_scores))
}

pub fn answer_routes() -> Router<AppState> {
    Router::new()
        .route("/questions/:id/answers", post(submit_answer))
        .route(
            "/questions/:id/answers/file",
            post(attach_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/answers/:id/scores", post(submit_score))
}

#[instrument(skip(state, caller, payload), fields(user_id = caller.user_id))]
pub async fn create_interview(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<CreateInterviewRequest>,
) -> Result<(StatusCode, Json<InterviewWithSession>), AppError> {
    let draft = validators::interview(payload)?;
    let (interview, session) = state.workflow.create_interview(&caller, draft).await?;
    Ok((StatusCode::CREATED, Json(InterviewWithSession { interview, session })))
}

#[instrument(skip(state, caller), fields(user_id = caller.user_id))]
pub async fn list_interviews(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<InterviewList>, AppError> {
    let (interviews, sessions) = state.workflow.list_interviews(&caller).await?;
    Ok(Json(InterviewList { interviews, sessions }))
}

#[instrument(skip(state, caller), fields(user_id = caller.user_id))]
pub async fn join(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<InterviewWithSession>, AppError> {
    let (interview, session) = state.workflow.join(&caller, id).await?;
    Ok(Json(InterviewWithSession { interview, session }))
}

#[instrument(skip(state, caller, payload), fields(user_id = caller.user_id))]
pub async fn invite(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(payload): Json<InviteRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.workflow.invite(&caller, id, &payload.email).await?;
    Ok(Json(SessionResponse { session }))
}

#[instrument(skip(state, caller), fields(user_id = caller.user_id))]
pub async fn list_sessions(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<SessionList>, AppError> {
    let sessions = state.workflow.list_sessions(&caller, id).await?;
    Ok(Json(SessionList { sessions }))
}

#[instrument(skip(state, caller), fields(user_id = caller.user_id))]
pub async fn publish(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, session_id)): Path<(i64, i64)>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.workflow.publish(&caller, id, session_id).await?;
    Ok(Json(SessionResponse { session }))
}

#[instrument(skip(state, caller, payload), fields(user_id = caller.user_id))]
pub async fn create_question(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<(StatusCode, Json<QuestionResponse>), AppError> {
    let question = state.workflow.create_question(&caller, id, payload).await?;
    Ok((StatusCode::CREATED, Json(QuestionResponse { question })))
}

#[instrument(skip(state, caller), fields(user_id = caller.user_id))]
pub async fn list_questions(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<QuestionList>, AppError> {
    let (questions, answers) = state.workflow.list_questions(&caller, id).await?;
    Ok(Json(QuestionList { questions, answers }))
}

#[instrument(skip(state, caller), fields(user_id = caller.user_id))]
pub async fn list_scores(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ScoreList>, AppError> {
    let scores = state.workflow.list_scores(&caller, id).await?;
    Ok(Json(ScoreList { scores }))
}

#[instrument(skip(state, caller, payload), fields(user_id = caller.user_id))]
pub async fn submit_answer(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    let answer = state.workflow.submit_answer(&caller, id, payload).await?;
    Ok(Json(AnswerResponse { answer }))
}

#[instrument(skip(state, caller, payload), fields(user_id = caller.user_id))]
pub async fn submit_score(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitScoreRequest>,
) -> Result<Json<ScoreResponse>, AppError> {
    let score = state.workflow.submit_score(&caller, id, payload.value).await?;
    Ok(Json(ScoreResponse { score }))
}

struct UploadItem {
    file_name: String,
    content_type: String,
    body: Bytes,
}

fn bad_upload(e: impl std::fmt::Display) -> AppError {
    warn!(error = %e, "multipart read failed");
    AppError::invalid("file", messages::BAD_UPLOAD)
}

/// First non-empty `file` part of the form, if any.
async fn read_upload(mp: &mut Multipart) -> Result<Option<UploadItem>, AppError> {
    while let Some(field) = mp.next_field().await.map_err(bad_upload)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let body = field.bytes().await.map_err(bad_upload)?;
        if body.is_empty() {
            return Ok(None);
        }
        return Ok(Some(UploadItem {
            file_name,
            content_type,
            body,
        }));
    }
    Ok(None)
}

/// POST /questions/:id/answers/file (multipart, field `file`).
/// A form without a file clears the stored one.
#[instrument(skip(state, caller, mp), fields(user_id = caller.user_id))]
pub async fn attach_file(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    mut mp: Multipart,
) -> Result<Json<AnswerResponse>, AppError> {
    let upload = read_upload(&mut mp).await?;
    state.workflow.file_answer_target(&caller, id).await?;

    let Some(item) = upload else {
        let answer = state.workflow.attach_file(&caller, id, None).await?;
        return Ok(Json(AnswerResponse { answer }));
    };

    let blobs = state
        .storage
        .clone()
        .ok_or_else(|| AppError::Unavailable(FieldError::new("file", messages::UPLOADS_DISABLED)))?;
    let key = storage::answer_key(caller.user_id, &item.file_name);
    let file = storage::upload(
        blobs.as_ref(),
        &key,
        &item.file_name,
        item.body,
        &item.content_type,
    )
    .await
    .map_err(|e| AppError::Storage(StoreError::Backend(e)))?;

    match state.workflow.attach_file(&caller, id, Some(file)).await {
        Ok(answer) => Ok(Json(AnswerResponse { answer })),
        Err(e) => {
            storage::discard(blobs.as_ref(), &key).await;
            Err(e)
        }
    }
}
