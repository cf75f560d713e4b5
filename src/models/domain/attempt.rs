use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::domain::variant::QuizVariant;

/// Lifecycle state of a quiz attempt.
///
/// `Reset` is a historical marker: the row stays for auditing but no longer
/// blocks a fresh attempt. All other terminal states are reachable only from
/// `InProgress`, and `Reset` is reachable only from a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    InProgress,
    Completed,
    Abandoned,
    Cheating,
    Reset,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::InProgress => "in_progress",
            AttemptState::Completed => "completed",
            AttemptState::Abandoned => "abandoned",
            AttemptState::Cheating => "cheating",
            AttemptState::Reset => "reset",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptState::InProgress)
    }

    /// The transition table of the attempt state machine. The store enforces
    /// this atomically via compare-and-set; this method is the single place
    /// the table is written down.
    pub fn can_transition_to(&self, to: AttemptState) -> bool {
        match self {
            AttemptState::InProgress => matches!(
                to,
                AttemptState::Completed
                    | AttemptState::Abandoned
                    | AttemptState::Cheating
                    | AttemptState::Reset
            ),
            AttemptState::Completed | AttemptState::Abandoned | AttemptState::Cheating => {
                matches!(to, AttemptState::Reset)
            }
            AttemptState::Reset => false,
        }
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an attempt was flagged as cheating. Stored on the attempt and echoed
/// back to teacher-facing views.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheatReason {
    LogoutDuringQuiz,
    VisibilityTimeout,
    TabSwitch,
}

impl CheatReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheatReason::LogoutDuringQuiz => "logout_during_quiz",
            CheatReason::VisibilityTimeout => "visibility_timeout",
            CheatReason::TabSwitch => "tab_switch",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    ProblemSolving,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::ProblemSolving => "problem_solving",
        }
    }
}

/// One student's run at one quiz variant, from start to a terminal state.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Attempt {
    pub id: String,
    pub student_id: String,
    pub variant: QuizVariant,
    pub state: AttemptState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Client-reported elapsed seconds; authoritative once the attempt is
    /// submitted, best-effort while in progress.
    pub completion_seconds: i64,
    pub score: i32,
    pub correct_count: i32,
    pub incorrect_count: i32,
    pub total_questions: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cheating_reason: Option<CheatReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Attempt {
    /// A fresh in-progress attempt with zeroed result fields.
    pub fn start(student_id: &str, variant: QuizVariant, total_questions: i32) -> Self {
        let now = Utc::now();
        Attempt {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            variant,
            state: AttemptState::InProgress,
            started_at: now,
            completed_at: None,
            last_heartbeat_at: None,
            completion_seconds: 0,
            score: 0,
            correct_count: 0,
            incorrect_count: 0,
            total_questions,
            cheating_reason: None,
            created_at: Some(now),
            modified_at: Some(now),
        }
    }

    /// Most recent liveness signal for staleness checks: the last heartbeat if
    /// the client ever sent one, otherwise the start time.
    pub fn last_seen_at(&self) -> DateTime<Utc> {
        self.last_heartbeat_at.unwrap_or(self.started_at)
    }
}

/// Result fields written atomically together with a state transition, so a
/// reader can never observe a terminal attempt with half-written scores.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttemptOutcome {
    pub score: i32,
    pub correct_count: i32,
    pub incorrect_count: i32,
    pub total_questions: i32,
    pub completion_seconds: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub cheating_reason: Option<CheatReason>,
}

impl AttemptOutcome {
    /// The forced-zero outcome stored when an attempt is flagged as cheating.
    pub fn cheating(total_questions: i32, reason: CheatReason) -> Self {
        AttemptOutcome {
            score: 0,
            correct_count: 0,
            incorrect_count: total_questions,
            total_questions,
            completion_seconds: 0,
            completed_at: None,
            cheating_reason: Some(reason),
        }
    }
}

/// One answer slot of one attempt. Upserted ungraded while the attempt is in
/// progress; rewritten with grading fields at submit; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AnswerRecord {
    pub id: String,
    pub attempt_id: String,
    /// 1-based; the variant's problem-solving slot is the last index.
    pub question_index: i32,
    pub kind: QuestionKind,
    pub student_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    pub is_correct: bool,
    pub points_earned: f64,
    /// Set once submit has written grading fields; guards the row against
    /// late ungraded writes from a stale client.
    pub graded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl AnswerRecord {
    pub fn ungraded(
        attempt_id: &str,
        question_index: i32,
        kind: QuestionKind,
        student_answer: &str,
    ) -> Self {
        let now = Utc::now();
        AnswerRecord {
            id: Uuid::new_v4().to_string(),
            attempt_id: attempt_id.to_string(),
            question_index,
            kind,
            student_answer: student_answer.to_string(),
            correct_answer: None,
            is_correct: false,
            points_earned: 0.0,
            graded: false,
            created_at: Some(now),
            modified_at: Some(now),
        }
    }
}
