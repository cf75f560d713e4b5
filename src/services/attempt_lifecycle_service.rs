use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::{AppError, AppResult};
use crate::models::domain::{
    AnswerRecord, Attempt, AttemptOutcome, AttemptState, CheatReason, QuizVariant,
    ScoreBreakdown,
};
use crate::models::dto::request::AnswerInput;
use crate::models::dto::response::{SaveProgressResponse, SubmitQuizResponse, SweepSummary};
use crate::repositories::AttemptStore;
use crate::services::answer_key::variant_spec;
use crate::services::class_directory::ClassDirectory;
use crate::services::notifier::CompletionNotifier;
use crate::services::scoring_service::ScoringEngine;

/// Drives every attempt through the state machine. All callers pass explicit
/// identity; nothing here reads ambient session state, so the rules hold no
/// matter which surface the call came through.
pub struct AttemptLifecycleService {
    store: Arc<dyn AttemptStore>,
    directory: Arc<dyn ClassDirectory>,
    notifier: Arc<dyn CompletionNotifier>,
}

impl AttemptLifecycleService {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        directory: Arc<dyn ClassDirectory>,
        notifier: Arc<dyn CompletionNotifier>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    /// Start a fresh attempt at a variant.
    ///
    /// Blocked while the student has any in-progress attempt, and while an
    /// unreset completed or cheating attempt exists for this variant.
    /// Abandoned attempts never block; losing the attempt is their only
    /// penalty. The pre-checks give precise messages, but the real guarantee
    /// is the store's one-active-attempt constraint, so a concurrent start
    /// race still resolves to a single winner.
    pub async fn start(&self, student_id: &str, variant: QuizVariant) -> AppResult<Attempt> {
        if let Some(active) = self.store.find_in_progress(student_id).await? {
            return Err(AppError::AttemptInProgress(format!(
                "attempt '{}' on '{}' is still in progress",
                active.id, active.variant
            )));
        }

        if let Some(existing) = self.store.find_current(student_id, variant).await? {
            if matches!(
                existing.state,
                AttemptState::Completed | AttemptState::Cheating
            ) {
                return Err(AppError::QuizAlreadyCompleted(format!(
                    "'{}' already has a {} attempt on '{}'; a teacher reset is required to retake",
                    student_id, existing.state, variant
                )));
            }
        }

        let spec = variant_spec(variant).ok_or_else(|| {
            AppError::InternalError(format!("No answer key registered for variant '{}'", variant))
        })?;

        let attempt = self
            .store
            .create_attempt(Attempt::start(student_id, variant, spec.total_questions()))
            .await?;

        log::info!(
            "Started attempt '{}' on '{}' for student '{}'",
            attempt.id,
            variant,
            student_id
        );
        Ok(attempt)
    }

    /// The attempt that currently matters for this student and variant: the
    /// one in progress, or the terminal one still blocking a retake.
    pub async fn check_existing(
        &self,
        student_id: &str,
        variant: QuizVariant,
    ) -> AppResult<Option<Attempt>> {
        self.store.find_current(student_id, variant).await
    }

    /// Persist in-flight answers and the elapsed clock without changing
    /// state. Answers that do not fit the variant layout are dropped and
    /// counted; the write is refused only when every answer is malformed.
    pub async fn save_progress(
        &self,
        student_id: &str,
        attempt_id: &str,
        answers: &[AnswerInput],
        elapsed_seconds: i64,
    ) -> AppResult<SaveProgressResponse> {
        let attempt = self.owned_attempt(student_id, attempt_id).await?;

        let spec = variant_spec(attempt.variant).ok_or_else(|| {
            AppError::InternalError(format!(
                "No answer key registered for variant '{}'",
                attempt.variant
            ))
        })?;

        let (valid, rejected): (Vec<&AnswerInput>, Vec<&AnswerInput>) = answers
            .iter()
            .partition(|answer| spec.accepts(answer.question_index, answer.kind));

        for bad in &rejected {
            log::warn!(
                "Rejecting answer for question {} of attempt '{}': not a {} slot of '{}'",
                bad.question_index,
                attempt_id,
                bad.kind.as_str(),
                attempt.variant
            );
        }
        if valid.is_empty() && !rejected.is_empty() {
            return Err(AppError::InvalidQuestionIndex(format!(
                "none of the {} submitted answers matched a question of '{}'",
                rejected.len(),
                attempt.variant
            )));
        }

        // The elapsed-time CAS doubles as the in-progress gate: once submit
        // has moved the attempt on, this fails before any answer is written.
        self.store.save_progress(attempt_id, elapsed_seconds).await?;

        for answer in &valid {
            self.store
                .upsert_answer(AnswerRecord::ungraded(
                    attempt_id,
                    answer.question_index,
                    answer.kind,
                    &answer.answer,
                ))
                .await?;
        }

        Ok(SaveProgressResponse {
            saved: valid.len(),
            rejected: rejected.len(),
        })
    }

    /// Record a liveness signal for an in-progress attempt.
    pub async fn heartbeat(&self, student_id: &str, attempt_id: &str) -> AppResult<()> {
        self.owned_attempt(student_id, attempt_id).await?;
        self.store.record_heartbeat(attempt_id, Utc::now()).await
    }

    /// Grade and complete an attempt.
    ///
    /// Grading is pure and happens before any write. The completing
    /// transition carries the whole outcome in one compare-and-set, so of two
    /// racing submits exactly one wins; the loser gets `InvalidTransition`
    /// and the stored score never changes again. Only the winner rewrites the
    /// answer rows as graded and fires the completion notification.
    pub async fn submit(
        &self,
        student_id: &str,
        attempt_id: &str,
        answers: &[AnswerInput],
        elapsed_seconds: i64,
    ) -> AppResult<SubmitQuizResponse> {
        let attempt = self.owned_attempt(student_id, attempt_id).await?;

        let breakdown = ScoringEngine::grade(attempt.variant, answers)?;

        let outcome = AttemptOutcome {
            score: breakdown.rounded_score(),
            correct_count: breakdown.correct_count,
            incorrect_count: breakdown.incorrect_count,
            total_questions: breakdown.total_questions,
            completion_seconds: elapsed_seconds,
            completed_at: Some(Utc::now()),
            cheating_reason: None,
        };

        let completed = self
            .store
            .transition_state(
                attempt_id,
                &[AttemptState::InProgress],
                AttemptState::Completed,
                Some(outcome),
            )
            .await?;

        self.store
            .replace_graded_answers(attempt_id, Self::graded_records(attempt_id, &breakdown))
            .await?;

        log::info!(
            "Attempt '{}' completed: {}/{} correct, score {}",
            attempt_id,
            breakdown.correct_count,
            breakdown.total_questions,
            completed.score
        );

        let notifier = Arc::clone(&self.notifier);
        let notified = completed.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.quiz_completed(&notified).await {
                log::error!(
                    "Completion notification for attempt '{}' failed: {}",
                    notified.id,
                    err
                );
            }
        });

        Ok(SubmitQuizResponse {
            attempt_id: attempt_id.to_string(),
            score: completed.score,
            total_questions: breakdown.total_questions,
            correct_answers: breakdown.correct_count,
            incorrect_answers: breakdown.incorrect_count,
            completion_seconds: elapsed_seconds,
            percentage: breakdown.percentage(),
            detailed_results: breakdown.questions.into_iter().map(Into::into).collect(),
        })
    }

    /// Flag an in-progress attempt as cheating. The stored outcome is forced
    /// to zero regardless of saved answers; the ungraded rows stay behind as
    /// evidence.
    pub async fn mark_cheating(
        &self,
        attempt_id: &str,
        reason: CheatReason,
    ) -> AppResult<Attempt> {
        let attempt = self
            .store
            .find_by_id(attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attempt '{}' not found", attempt_id)))?;

        let flagged = self
            .store
            .transition_state(
                attempt_id,
                &[AttemptState::InProgress],
                AttemptState::Cheating,
                Some(AttemptOutcome::cheating(attempt.total_questions, reason)),
            )
            .await?;

        log::warn!(
            "Attempt '{}' of student '{}' flagged as cheating ({})",
            attempt_id,
            flagged.student_id,
            reason.as_str()
        );
        Ok(flagged)
    }

    /// Abandon every in-progress attempt whose last liveness signal predates
    /// `cutoff`. Attempts that complete or get flagged mid-sweep lose their
    /// CAS and are skipped.
    pub async fn abandon_stale(&self, cutoff: DateTime<Utc>) -> AppResult<SweepSummary> {
        let stale = self.store.find_stale_in_progress(cutoff).await?;
        let examined = stale.len();
        let mut abandoned = 0usize;

        for attempt in stale {
            match self
                .store
                .transition_state(
                    &attempt.id,
                    &[AttemptState::InProgress],
                    AttemptState::Abandoned,
                    None,
                )
                .await
            {
                Ok(_) => {
                    abandoned += 1;
                    log::info!(
                        "Abandoned stale attempt '{}' of student '{}' (last seen {})",
                        attempt.id,
                        attempt.student_id,
                        attempt.last_seen_at()
                    );
                }
                Err(AppError::InvalidTransition(_)) => {
                    // Lost the race against a submit or cheating flag.
                }
                Err(err) => return Err(err),
            }
        }

        Ok(SweepSummary {
            examined,
            abandoned,
        })
    }

    /// Teacher-initiated reset: retire every terminal attempt for the
    /// student/variant pair and drop its answer rows, unblocking a retake.
    /// Only the student's own teacher may do this; anyone else gets
    /// `NotAuthorized`, never a hint of what data exists.
    pub async fn reset_student_quiz(
        &self,
        teacher_id: &str,
        student_id: &str,
        variant: QuizVariant,
    ) -> AppResult<u64> {
        let assigned = self.directory.teacher_for_student(student_id).await?;
        if assigned.as_deref() != Some(teacher_id) {
            return Err(AppError::NotAuthorized(format!(
                "'{}' is not the assigned teacher of '{}'",
                teacher_id, student_id
            )));
        }

        let attempts = self
            .store
            .find_by_student_and_variant(student_id, variant)
            .await?;

        let mut reset_count = 0u64;
        for attempt in attempts {
            if !matches!(
                attempt.state,
                AttemptState::Completed | AttemptState::Abandoned | AttemptState::Cheating
            ) {
                continue;
            }

            self.store.delete_answers(&attempt.id).await?;
            match self
                .store
                .transition_state(
                    &attempt.id,
                    &[
                        AttemptState::Completed,
                        AttemptState::Abandoned,
                        AttemptState::Cheating,
                    ],
                    AttemptState::Reset,
                    None,
                )
                .await
            {
                Ok(_) => reset_count += 1,
                Err(AppError::InvalidTransition(_)) => {
                    // Already reset by a concurrent request.
                }
                Err(err) => return Err(err),
            }
        }

        log::info!(
            "Teacher '{}' reset {} attempt(s) of student '{}' on '{}'",
            teacher_id,
            reset_count,
            student_id,
            variant
        );
        Ok(reset_count)
    }

    async fn owned_attempt(&self, student_id: &str, attempt_id: &str) -> AppResult<Attempt> {
        let attempt = self
            .store
            .find_by_id(attempt_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Attempt '{}' not found", attempt_id)))?;

        if attempt.student_id != student_id {
            return Err(AppError::NotAuthorized(format!(
                "attempt '{}' does not belong to '{}'",
                attempt_id, student_id
            )));
        }
        Ok(attempt)
    }

    fn graded_records(attempt_id: &str, breakdown: &ScoreBreakdown) -> Vec<AnswerRecord> {
        let now = Utc::now();
        breakdown
            .questions
            .iter()
            .map(|question| AnswerRecord {
                id: uuid::Uuid::new_v4().to_string(),
                attempt_id: attempt_id.to_string(),
                question_index: question.question_index,
                kind: question.kind,
                student_answer: question.student_answer.clone(),
                correct_answer: question.correct_answer.clone(),
                is_correct: question.is_correct,
                points_earned: question.points_earned,
                graded: true,
                created_at: Some(now),
                modified_at: Some(now),
            })
            .collect()
    }
}
