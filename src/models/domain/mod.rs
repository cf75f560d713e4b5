pub mod attempt;
pub mod score;
pub mod variant;

pub use attempt::{AnswerRecord, Attempt, AttemptOutcome, AttemptState, CheatReason, QuestionKind};
pub use score::{QuestionScore, ScoreBreakdown};
pub use variant::QuizVariant;
