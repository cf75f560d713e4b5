use std::collections::BTreeMap;

use crate::errors::{AppError, AppResult};
use crate::models::domain::{QuestionKind, QuestionScore, QuizVariant, ScoreBreakdown};
use crate::models::dto::request::AnswerInput;
use crate::services::answer_key::{variant_spec, QuizVariantSpec};

/// Pure grading engine. Never touches storage; the same variant and answers
/// always produce the same breakdown.
pub struct ScoringEngine;

impl ScoringEngine {
    /// Grade a full answer set against the variant's key.
    ///
    /// Malformed answers (index outside the variant, or kind not matching the
    /// slot) are skipped with a warning so one bad entry cannot sink an
    /// otherwise valid submission. Only when every submitted answer is
    /// malformed does grading refuse with `InvalidQuestionIndex`. A question
    /// with no surviving answer scores zero and counts as incorrect.
    pub fn grade(variant: QuizVariant, answers: &[AnswerInput]) -> AppResult<ScoreBreakdown> {
        let spec = variant_spec(variant).ok_or_else(|| {
            AppError::InternalError(format!("No answer key registered for variant '{}'", variant))
        })?;

        let usable = Self::collect_usable(spec, answers)?;

        let mut questions = Vec::with_capacity(spec.total_questions() as usize);
        let mut total_points = 0.0;
        let mut correct_count = 0;

        for (offset, key) in spec.multiple_choice_key().iter().enumerate() {
            let question_index = offset as i32 + 1;
            let student_answer = usable
                .get(&question_index)
                .map(|answer| answer.answer.as_str())
                .unwrap_or("");

            let is_correct =
                !student_answer.is_empty() && student_answer.trim().to_lowercase() == key.to_lowercase();
            let points_earned = if is_correct { 1.0 } else { 0.0 };
            total_points += points_earned;
            if is_correct {
                correct_count += 1;
            }

            questions.push(QuestionScore {
                question_index,
                kind: QuestionKind::MultipleChoice,
                student_answer: student_answer.to_string(),
                correct_answer: Some(key.to_string()),
                is_correct,
                points_earned,
                max_points: 1.0,
            });
        }

        if let (Some(question_index), Some(grader)) = (spec.problem_solving_index(), spec.grader())
        {
            let student_answer = usable
                .get(&question_index)
                .map(|answer| answer.answer.as_str())
                .unwrap_or("");

            let points_earned = if student_answer.is_empty() {
                0.0
            } else {
                grader.grade(student_answer)
            };
            let is_correct = points_earned >= grader.correct_threshold();
            total_points += points_earned;
            if is_correct {
                correct_count += 1;
            }

            questions.push(QuestionScore {
                question_index,
                kind: QuestionKind::ProblemSolving,
                student_answer: student_answer.to_string(),
                correct_answer: grader.reference_answer(),
                is_correct,
                points_earned,
                max_points: grader.max_points(),
            });
        }

        let total_questions = spec.total_questions();
        Ok(ScoreBreakdown {
            variant,
            total_points,
            max_points: spec.max_points(),
            correct_count,
            incorrect_count: total_questions - correct_count,
            total_questions,
            questions,
        })
    }

    /// Validate answers against the variant layout, dropping malformed ones.
    /// Duplicate indices resolve to the last submitted answer.
    fn collect_usable<'a>(
        spec: &QuizVariantSpec,
        answers: &'a [AnswerInput],
    ) -> AppResult<BTreeMap<i32, &'a AnswerInput>> {
        let mut usable: BTreeMap<i32, &AnswerInput> = BTreeMap::new();
        let mut malformed = 0usize;

        for answer in answers {
            match spec.kind_for_index(answer.question_index) {
                Some(expected) if expected == answer.kind => {
                    usable.insert(answer.question_index, answer);
                }
                Some(expected) => {
                    malformed += 1;
                    log::warn!(
                        "Skipping answer with kind {:?} for question {} of '{}' (slot is {:?})",
                        answer.kind,
                        answer.question_index,
                        spec.variant,
                        expected
                    );
                }
                None => {
                    malformed += 1;
                    log::warn!(
                        "Skipping answer for out-of-range question {} of '{}'",
                        answer.question_index,
                        spec.variant
                    );
                }
            }
        }

        if usable.is_empty() && malformed > 0 {
            return Err(AppError::InvalidQuestionIndex(format!(
                "none of the {} submitted answers matched a question of '{}'",
                malformed, spec.variant
            )));
        }

        Ok(usable)
    }
}
