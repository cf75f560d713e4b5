use crate::models::domain::{Attempt, AttemptState, QuizVariant};
use crate::models::dto::request::AnswerInput;

#[cfg(test)]
pub mod fixtures {
    use super::*;
    use crate::models::domain::QuestionKind;
    use chrono::{Duration, Utc};

    /// Creates a fresh in-progress attempt for a standard test student.
    pub fn in_progress_attempt() -> Attempt {
        Attempt::start("student-1", QuizVariant::Functions, 11)
    }

    /// Creates a completed attempt with the given score and timing.
    pub fn completed_attempt(
        student_id: &str,
        variant: QuizVariant,
        score: i32,
        completion_seconds: i64,
    ) -> Attempt {
        let mut attempt = Attempt::start(student_id, variant, 11);
        attempt.state = AttemptState::Completed;
        attempt.score = score;
        attempt.completion_seconds = completion_seconds;
        attempt.completed_at = Some(Utc::now());
        attempt
    }

    /// Creates an in-progress attempt whose last liveness signal is `hours`
    /// hours in the past.
    pub fn stale_attempt(student_id: &str, hours: i64) -> Attempt {
        let mut attempt = Attempt::start(student_id, QuizVariant::Functions, 11);
        attempt.started_at = Utc::now() - Duration::hours(hours);
        attempt.last_heartbeat_at = Some(attempt.started_at);
        attempt
    }

    /// A multiple-choice answer for a 1-based question index.
    pub fn choice(question_index: i32, answer: &str) -> AnswerInput {
        AnswerInput {
            question_index,
            kind: QuestionKind::MultipleChoice,
            answer: answer.to_string(),
        }
    }

    /// A free-response answer for the variant's closing question.
    pub fn free_response(question_index: i32, answer: &str) -> AnswerInput {
        AnswerInput {
            question_index,
            kind: QuestionKind::ProblemSolving,
            answer: answer.to_string(),
        }
    }
}

#[cfg(test)]
pub mod test_helpers {
    use actix_web::http::StatusCode;

    /// Asserts that a status code represents an error (4xx or 5xx)
    pub fn assert_error_status(status: StatusCode) {
        assert!(
            status.is_client_error() || status.is_server_error(),
            "Expected error status, got: {}",
            status
        );
    }

    /// Asserts that a status code represents success (2xx)
    pub fn assert_success_status(status: StatusCode) {
        assert!(
            status.is_success(),
            "Expected success status, got: {}",
            status
        );
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_fixtures_in_progress_attempt() {
        let attempt = in_progress_attempt();
        assert_eq!(attempt.student_id, "student-1");
        assert_eq!(attempt.state, AttemptState::InProgress);
        assert_eq!(attempt.total_questions, 11);
    }

    #[test]
    fn test_fixtures_completed_attempt() {
        let attempt = completed_attempt("student-2", QuizVariant::RationalFunctions, 9, 300);
        assert_eq!(attempt.state, AttemptState::Completed);
        assert_eq!(attempt.score, 9);
        assert!(attempt.completed_at.is_some());
    }

    #[test]
    fn test_fixtures_stale_attempt_is_old() {
        let attempt = stale_attempt("student-3", 3);
        let age = chrono::Utc::now() - attempt.last_seen_at();
        assert!(age.num_hours() >= 3);
    }
}
