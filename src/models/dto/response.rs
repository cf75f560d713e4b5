use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::domain::{
    Attempt, AttemptState, CheatReason, QuestionKind, QuestionScore, QuizVariant,
};

#[derive(Debug, Clone, Serialize)]
pub struct AttemptDto {
    pub id: String,
    pub student_id: String,
    pub variant: QuizVariant,
    pub state: AttemptState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub completion_seconds: i64,
    pub score: i32,
    pub correct_count: i32,
    pub incorrect_count: i32,
    pub total_questions: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cheating_reason: Option<CheatReason>,
}

impl From<Attempt> for AttemptDto {
    fn from(attempt: Attempt) -> Self {
        AttemptDto {
            id: attempt.id,
            student_id: attempt.student_id,
            variant: attempt.variant,
            state: attempt.state,
            started_at: attempt.started_at,
            completed_at: attempt.completed_at,
            completion_seconds: attempt.completion_seconds,
            score: attempt.score,
            correct_count: attempt.correct_count,
            incorrect_count: attempt.incorrect_count,
            total_questions: attempt.total_questions,
            cheating_reason: attempt.cheating_reason,
        }
    }
}

/// Returned by start so the client also learns the heartbeat cadence.
#[derive(Debug, Clone, Serialize)]
pub struct StartQuizResponse {
    pub attempt: AttemptDto,
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentAttemptResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<AttemptDto>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveProgressResponse {
    pub saved: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionResultDto {
    pub question_index: i32,
    pub kind: QuestionKind,
    pub student_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    pub is_correct: bool,
    pub points_earned: f64,
    pub max_points: f64,
}

impl From<QuestionScore> for QuestionResultDto {
    fn from(question: QuestionScore) -> Self {
        QuestionResultDto {
            question_index: question.question_index,
            kind: question.kind,
            student_answer: question.student_answer,
            correct_answer: question.correct_answer,
            is_correct: question.is_correct,
            points_earned: question.points_earned,
            max_points: question.max_points,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitQuizResponse {
    pub attempt_id: String,
    pub score: i32,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub incorrect_answers: i32,
    pub completion_seconds: i64,
    pub percentage: f64,
    pub detailed_results: Vec<QuestionResultDto>,
}

/// Acknowledgement of a cheating flag: the stored score is forced to zero
/// no matter what had been answered.
#[derive(Debug, Clone, Serialize)]
pub struct CheatingAck {
    pub score: i32,
    pub cheating_detected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetQuizResponse {
    pub student_id: String,
    pub variant: QuizVariant,
    pub reset_count: u64,
}

/// Result of one sweep pass over stale in-progress attempts.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub examined: usize,
    pub abandoned: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntryDto {
    pub rank: usize,
    pub student_id: String,
    pub display_name: String,
    pub score: i32,
    pub percentage: f64,
    pub completion_seconds: i64,
    pub is_current_user: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardResponse {
    pub variant: QuizVariant,
    pub entries: Vec<LeaderboardEntryDto>,
}
