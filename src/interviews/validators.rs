//! Shape checks run before any workflow mutation. Each returns a validated
//! value or every field problem at once as `AppError::Validation`.

use serde_json::Value;

use super::dto::{CreateInterviewRequest, CreateQuestionRequest, NewInterview, SubmitAnswerRequest};
use super::repo_types::{Question, QuestionType};
use crate::error::{messages, AppError, FieldError};

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 500;
pub const MAX_TEXT_LIMIT: i64 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionDraft {
    pub title: String,
    pub description: Option<String>,
    pub kind: QuestionType,
    pub values: Vec<String>,
    pub limit: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerDraft {
    pub text: String,
    pub values: Vec<String>,
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn interview(req: CreateInterviewRequest) -> Result<NewInterview, AppError> {
    let mut errors = Vec::new();
    let title = non_empty(req.title);
    if title.is_none() {
        errors.push(FieldError::new("title", messages::REQUIRED));
    }
    if req.start_time.is_none() {
        errors.push(FieldError::new("startTime", messages::REQUIRED));
    }
    if req.end_time.is_none() {
        errors.push(FieldError::new("endTime", messages::REQUIRED));
    }
    match (title, req.start_time, req.end_time) {
        (Some(title), Some(start_time), Some(end_time)) if errors.is_empty() => Ok(NewInterview {
            title,
            description: non_empty(req.description),
            start_time,
            end_time,
        }),
        _ => Err(AppError::Validation(errors)),
    }
}

pub fn question(req: CreateQuestionRequest) -> Result<QuestionDraft, AppError> {
    let mut errors = Vec::new();

    let title = non_empty(req.title).unwrap_or_default();
    if title.is_empty() {
        errors.push(FieldError::new("title", messages::REQUIRED));
    } else if title.chars().count() > MAX_TITLE_CHARS {
        errors.push(FieldError::new("title", messages::TITLE_TOO_LONG));
    }

    let description = non_empty(req.description);
    if description
        .as_ref()
        .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_CHARS)
    {
        errors.push(FieldError::new("description", messages::DESCRIPTION_TOO_LONG));
    }

    let kind = req.kind.as_deref().and_then(|k| k.parse::<QuestionType>().ok());
    let mut values = Vec::new();
    match kind {
        None => errors.push(FieldError::new("type", messages::BAD_QUESTION_TYPE)),
        Some(k) if k.is_choice() => match req.values.as_ref() {
            None | Some(Value::Null) => {
                errors.push(FieldError::new("values", messages::VALUES_REQUIRED))
            }
            Some(raw) => match string_list(raw) {
                Some(list) => values = list,
                None => errors.push(FieldError::new("values", messages::VALUES_NOT_STRINGS)),
            },
        },
        Some(_) => {}
    }

    let mut limit = None;
    if kind == Some(QuestionType::Text) {
        match req.limit {
            None | Some(i64::MIN..=0) => {
                errors.push(FieldError::new("limit", messages::LIMIT_REQUIRED))
            }
            Some(l) if l > MAX_TEXT_LIMIT => {
                errors.push(FieldError::new("limit", messages::LIMIT_TOO_LARGE))
            }
            Some(l) => limit = i32::try_from(l).ok(),
        }
    }

    match kind {
        Some(kind) if errors.is_empty() => Ok(QuestionDraft {
            title,
            description,
            kind,
            values,
            limit,
        }),
        _ => Err(AppError::Validation(errors)),
    }
}

/// Checks a submission against the question it answers.
///
/// Checkbox questions accept exactly one selected value. That mirrors the
/// behaviour clients rely on today even though checkboxes usually allow several.
pub fn answer(question: &Question, req: SubmitAnswerRequest) -> Result<AnswerDraft, AppError> {
    match question.kind {
        QuestionType::Text => {
            let text = req.text.unwrap_or_default();
            let limit = question.limit.unwrap_or(0).max(0) as usize;
            if text.chars().count() > limit {
                return Err(AppError::invalid("text", messages::ANSWER_TOO_LONG));
            }
            Ok(AnswerDraft {
                text,
                values: Vec::new(),
            })
        }
        QuestionType::File => Ok(AnswerDraft {
            text: String::new(),
            values: Vec::new(),
        }),
        QuestionType::Radio | QuestionType::Checkbox => {
            let values = match req.values.as_ref() {
                None | Some(Value::Null) => {
                    return Err(AppError::invalid("values", messages::VALUES_REQUIRED))
                }
                Some(raw) => string_list(raw)
                    .ok_or_else(|| AppError::invalid("values", messages::VALUES_NOT_STRINGS))?,
            };
            if question.kind == QuestionType::Checkbox && values.len() != 1 {
                return Err(AppError::invalid("values", messages::SINGLE_VALUE));
            }
            Ok(AnswerDraft {
                text: String::new(),
                values,
            })
        }
    }
}
