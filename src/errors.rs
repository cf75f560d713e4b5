use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// The student already has an in-progress attempt, possibly on another
    /// variant. Carries the blocking attempt id.
    #[error("Attempt in progress: {0}")]
    AttemptInProgress(String),

    /// A completed or cheating-flagged attempt exists for this variant and
    /// has not been reset by a teacher.
    #[error("Quiz already completed: {0}")]
    QuizAlreadyCompleted(String),

    /// The lifecycle state machine rejected the requested transition.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// None of the submitted answers matched a question slot of the variant.
    #[error("Invalid question index: {0}")]
    InvalidQuestionIndex(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A collaborator service (class directory, completion webhook) failed.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::AttemptInProgress(_) => "ATTEMPT_IN_PROGRESS",
            AppError::QuizAlreadyCompleted(_) => "QUIZ_ALREADY_COMPLETED",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::NotAuthorized(_) => "NOT_AUTHORIZED",
            AppError::InvalidQuestionIndex(_) => "INVALID_QUESTION_INDEX",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub status: u16,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AttemptInProgress(_) => StatusCode::CONFLICT,
            AppError::QuizAlreadyCompleted(_) => StatusCode::CONFLICT,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            AppError::InvalidQuestionIndex(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            code: self.error_code(),
            status: self.status_code().as_u16(),
        })
    }
}
impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::StoreUnavailable(err.to_string())
    }
}
impl From<mongodb::bson::ser::Error> for AppError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        AppError::InternalError(format!("BSON serialization error: {}", err))
    }
}
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
