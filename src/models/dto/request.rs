use serde::Deserialize;
use validator::Validate;

use crate::models::domain::{CheatReason, QuestionKind};

/// One answer slot as sent by the client. Indices are 1-based; the variant
/// spec decides whether an index/kind pair is valid.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnswerInput {
    #[validate(range(min = 1, message = "Question index must be 1-based"))]
    pub question_index: i32,
    pub kind: QuestionKind,
    #[validate(length(max = 2000, message = "Answer too long"))]
    pub answer: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaveProgressRequest {
    #[validate(nested)]
    pub answers: Vec<AnswerInput>,
    #[validate(range(min = 0, message = "Elapsed seconds cannot be negative"))]
    pub elapsed_seconds: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitQuizRequest {
    #[validate(nested)]
    pub answers: Vec<AnswerInput>,
    #[validate(range(min = 0, message = "Elapsed seconds cannot be negative"))]
    pub elapsed_seconds: i64,
}

/// Client-detected disengagement signal (logout, hidden tab, tab switch).
#[derive(Debug, Clone, Deserialize)]
pub struct DisengagementReport {
    pub reason: CheatReason,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResetQuizRequest {
    #[validate(length(min = 1, message = "Student id is required"))]
    pub student_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LeaderboardQuery {
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<i64>,
    pub class_id: Option<String>,
}
