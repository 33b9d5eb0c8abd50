use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::store::StoreError;

/// One rejected field and the reason, the only error record callers ever see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(FieldError),
    #[error("forbidden: {0}")]
    Forbidden(FieldError),
    #[error("conflict: {0}")]
    Conflict(FieldError),
    #[error("validation failed ({} field(s))", .0.len())]
    Validation(Vec<FieldError>),
    #[error("unauthorized: {0}")]
    Unauthorized(FieldError),
    #[error("sequence allocation failed for {sequence}")]
    AllocationFailed {
        sequence: String,
        #[source]
        source: StoreError,
    },
    /// A multi-step transition wrote its first record and could neither finish nor undo it.
    #[error("partial write during {step}")]
    PartialWrite {
        step: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("unavailable: {0}")]
    Unavailable(FieldError),
    #[error("storage error")]
    Storage(#[source] StoreError),
}

impl AppError {
    pub fn not_found(field: &str, message: &str) -> Self {
        Self::NotFound(FieldError::new(field, message))
    }

    pub fn forbidden(field: &str, message: &str) -> Self {
        Self::Forbidden(FieldError::new(field, message))
    }

    pub fn conflict(field: &str, message: &str) -> Self {
        Self::Conflict(FieldError::new(field, message))
    }

    pub fn invalid(field: &str, message: &str) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::Unauthorized(FieldError::new("authorization", message))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::AllocationFailed { .. } | AppError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::PartialWrite { .. } | AppError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(key) => {
                AppError::Conflict(FieldError::new(key, messages::ALREADY_EXISTS))
            }
            StoreError::Missing(what) => {
                AppError::NotFound(FieldError::new(what, messages::NOT_FOUND))
            }
            StoreError::Locked => AppError::Conflict(FieldError::new("published", messages::PUBLISHED)),
            other => AppError::Storage(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(errors) => json!({ "errors": errors }),
            AppError::NotFound(e)
            | AppError::Forbidden(e)
            | AppError::Conflict(e)
            | AppError::Unauthorized(e)
            | AppError::Unavailable(e) => json!({ "error": e }),
            AppError::AllocationFailed { sequence, source } => {
                error!(error = %source, %sequence, "id allocation failed");
                json!({ "error": FieldError::new("id", messages::ALLOCATION_FAILED) })
            }
            AppError::PartialWrite { step, source } => {
                error!(error = %source, step, "partial write left an orphaned record");
                json!({ "error": FieldError::new(step, messages::PARTIAL_WRITE) })
            }
            AppError::Storage(source) => {
                error!(error = %source, "storage failure");
                json!({ "error": FieldError::new("storage", messages::STORAGE) })
            }
        };
        (status, Json(body)).into_response()
    }
}

pub mod messages {
    pub const REQUIRED: &str = "must not be empty";
    pub const NOT_FOUND: &str = "does not exist";
    pub const ALREADY_EXISTS: &str = "already exists";
    pub const STORAGE: &str = "storage is unavailable, try again";
    pub const ALLOCATION_FAILED: &str = "could not allocate an id, try again";
    pub const PARTIAL_WRITE: &str = "operation partially applied, needs reconciliation";

    pub const INVALID_EMAIL: &str = "is not a valid email address";
    pub const PASSWORD_LENGTH: &str = "must be between 8 and 64 characters";
    pub const EMAIL_TAKEN: &str = "is already registered";
    pub const INVALID_CREDENTIALS: &str = "invalid credentials";
    pub const MISSING_TOKEN: &str = "missing bearer token";
    pub const INVALID_TOKEN: &str = "invalid or expired token";
    pub const UPLOADS_DISABLED: &str = "file uploads are not configured";
    pub const BAD_UPLOAD: &str = "could not read the uploaded file";

    pub const NO_INTERVIEW: &str = "interview does not exist";
    pub const NO_QUESTION: &str = "question does not exist";
    pub const NO_ANSWER: &str = "answer does not exist";
    pub const NO_SESSION: &str = "session does not exist";
    pub const NO_USER: &str = "no user with that email";

    pub const NOT_MASTER: &str = "only the interview master may do this";
    pub const NOT_INTERVIEWER: &str = "only interviewers may do this";
    pub const NOT_PARTICIPANT: &str = "no session for this interview";
    pub const NOT_INTERVIEWEE: &str = "only interviewees may answer";
    pub const CANNOT_JOIN: &str = "not allowed to join as interviewee";
    pub const INVITE_SELF: &str = "cannot invite yourself";
    pub const PUBLISHED: &str = "answers are locked after publishing";
    pub const PUBLISH_TARGET: &str = "only interviewee sessions can be published";
    pub const NO_OWN_ANSWER: &str = "answer the question before attaching a file";

    pub const TITLE_TOO_LONG: &str = "must be at most 100 characters";
    pub const DESCRIPTION_TOO_LONG: &str = "must be at most 500 characters";
    pub const BAD_QUESTION_TYPE: &str = "must be one of text, file, radio, checkbox";
    pub const VALUES_REQUIRED: &str = "options are required for choice questions";
    pub const VALUES_NOT_STRINGS: &str = "must be a list of strings";
    pub const LIMIT_REQUIRED: &str = "a positive limit is required for text questions";
    pub const LIMIT_TOO_LARGE: &str = "must be at most 10000";
    pub const ANSWER_TOO_LONG: &str = "exceeds the question's length limit";
    pub const SINGLE_VALUE: &str = "exactly one value must be selected";
    pub const NOT_FILE_QUESTION: &str = "question does not accept files";
}
