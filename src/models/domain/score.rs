use serde::{Deserialize, Serialize};

use crate::models::domain::attempt::QuestionKind;
use crate::models::domain::variant::QuizVariant;

/// Deterministic grading result for one submitted answer set. One
/// `QuestionScore` per question index of the variant, including unanswered
/// slots at zero points.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ScoreBreakdown {
    pub variant: QuizVariant,
    pub total_points: f64,
    pub max_points: f64,
    pub correct_count: i32,
    pub incorrect_count: i32,
    pub total_questions: i32,
    pub questions: Vec<QuestionScore>,
}

impl ScoreBreakdown {
    /// Stored attempt scores are integer points; per-question partial credit
    /// may be fractional, so the persisted total is the rounded sum.
    pub fn rounded_score(&self) -> i32 {
        self.total_points.round() as i32
    }

    pub fn percentage(&self) -> f64 {
        if self.max_points <= 0.0 {
            return 0.0;
        }
        (self.total_points / self.max_points) * 100.0
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct QuestionScore {
    pub question_index: i32,
    pub kind: QuestionKind,
    pub student_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    pub is_correct: bool,
    pub points_earned: f64,
    pub max_points: f64,
}
