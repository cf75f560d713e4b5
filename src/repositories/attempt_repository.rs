use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc},
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
    Collection, IndexModel,
};

use crate::{
    config::Config,
    db::Database,
    errors::{AppError, AppResult},
    models::domain::{AnswerRecord, Attempt, AttemptOutcome, AttemptState, QuizVariant},
};

/// Persistence contract for attempts and their answer rows.
///
/// The store is the only place attempt state changes, and every transition is
/// a compare-and-set: the filter carries the allowed source states, so two
/// racing callers resolve to one winner and one `InvalidTransition`.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Insert a fresh attempt. Fails `AttemptInProgress` when the student
    /// already has an in-progress attempt on any variant.
    async fn create_attempt(&self, attempt: Attempt) -> AppResult<Attempt>;
    async fn find_by_id(&self, attempt_id: &str) -> AppResult<Option<Attempt>>;
    /// The student's in-progress attempt regardless of variant, if any.
    async fn find_in_progress(&self, student_id: &str) -> AppResult<Option<Attempt>>;
    /// The attempt that currently matters for this student and variant: the
    /// in-progress one if it exists, else the latest completed or cheating
    /// attempt that still blocks a retake.
    async fn find_current(
        &self,
        student_id: &str,
        variant: QuizVariant,
    ) -> AppResult<Option<Attempt>>;
    /// Every attempt the student has made at this variant, newest first.
    async fn find_by_student_and_variant(
        &self,
        student_id: &str,
        variant: QuizVariant,
    ) -> AppResult<Vec<Attempt>>;
    /// Update the client-reported elapsed time. CAS on in_progress.
    async fn save_progress(&self, attempt_id: &str, elapsed_seconds: i64) -> AppResult<()>;
    /// Record a liveness signal. CAS on in_progress.
    async fn record_heartbeat(&self, attempt_id: &str, at: DateTime<Utc>) -> AppResult<()>;
    /// Last-write-wins upsert of an ungraded answer keyed on
    /// `(attempt_id, question_index)`. A row that has been graded is left
    /// untouched; the late write is dropped.
    async fn upsert_answer(&self, record: AnswerRecord) -> AppResult<()>;
    /// Replace the attempt's answer rows with the graded set. Submit path;
    /// called only by the caller that won the completing transition.
    async fn replace_graded_answers(
        &self,
        attempt_id: &str,
        records: Vec<AnswerRecord>,
    ) -> AppResult<()>;
    async fn list_answers(&self, attempt_id: &str) -> AppResult<Vec<AnswerRecord>>;
    /// Atomically move the attempt from one of `from_allowed` to `to`,
    /// writing the outcome fields in the same update. Returns the attempt as
    /// stored after the transition; `InvalidTransition` when the current
    /// state matched none of `from_allowed`.
    async fn transition_state(
        &self,
        attempt_id: &str,
        from_allowed: &[AttemptState],
        to: AttemptState,
        outcome: Option<AttemptOutcome>,
    ) -> AppResult<Attempt>;
    async fn delete_answers(&self, attempt_id: &str) -> AppResult<u64>;
    /// Completed attempts for a variant, optionally narrowed to a resolved
    /// roster of student ids.
    async fn find_completed_for_ranking(
        &self,
        variant: QuizVariant,
        student_filter: Option<&[String]>,
    ) -> AppResult<Vec<Attempt>>;
    /// In-progress attempts whose last liveness signal predates `cutoff`.
    async fn find_stale_in_progress(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Attempt>>;
}

pub struct MongoAttemptStore {
    attempts: Collection<Attempt>,
    answers: Collection<AnswerRecord>,
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}

impl MongoAttemptStore {
    pub fn new(db: &Database, config: &Config) -> Self {
        let attempts = db.get_collection(&config.attempts_collection);
        let answers = db.get_collection(&config.answers_collection);
        Self { attempts, answers }
    }

    pub async fn ensure_indexes(&self) -> AppResult<()> {
        log::info!("Creating indexes for attempts and answers collections");

        let id_index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("id_unique".to_string())
                    .build(),
            )
            .build();

        // Partial unique index backing the one-active-attempt rule. Inserting
        // a second in-progress attempt for the same student fails with a
        // duplicate key, which create_attempt maps to AttemptInProgress.
        let one_active_index = IndexModel::builder()
            .keys(doc! { "student_id": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .partial_filter_expression(doc! { "state": "in_progress" })
                    .name("one_active_attempt".to_string())
                    .build(),
            )
            .build();

        let student_variant_index = IndexModel::builder()
            .keys(doc! { "student_id": 1, "variant": 1 })
            .options(
                IndexOptions::builder()
                    .name("student_variant".to_string())
                    .build(),
            )
            .build();

        // state-first so the sweep's state-only query can use the prefix.
        let state_variant_index = IndexModel::builder()
            .keys(doc! { "state": 1, "variant": 1 })
            .options(
                IndexOptions::builder()
                    .name("state_variant".to_string())
                    .build(),
            )
            .build();

        self.attempts.create_index(id_index).await?;
        self.attempts.create_index(one_active_index).await?;
        self.attempts.create_index(student_variant_index).await?;
        self.attempts.create_index(state_variant_index).await?;

        let answer_slot_index = IndexModel::builder()
            .keys(doc! { "attempt_id": 1, "question_index": 1 })
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .name("answer_slot".to_string())
                    .build(),
            )
            .build();

        let answer_attempt_index = IndexModel::builder()
            .keys(doc! { "attempt_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("attempt_id".to_string())
                    .build(),
            )
            .build();

        self.answers.create_index(answer_slot_index).await?;
        self.answers.create_index(answer_attempt_index).await?;

        log::info!("Successfully created indexes for attempts and answers collections");
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for MongoAttemptStore {
    async fn create_attempt(&self, attempt: Attempt) -> AppResult<Attempt> {
        match self.attempts.insert_one(&attempt).await {
            Ok(_) => Ok(attempt),
            Err(err) if is_duplicate_key(&err) => Err(AppError::AttemptInProgress(format!(
                "student '{}' already has an attempt in progress",
                attempt.student_id
            ))),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_id(&self, attempt_id: &str) -> AppResult<Option<Attempt>> {
        let attempt = self.attempts.find_one(doc! { "id": attempt_id }).await?;
        Ok(attempt)
    }

    async fn find_in_progress(&self, student_id: &str) -> AppResult<Option<Attempt>> {
        let attempt = self
            .attempts
            .find_one(doc! {
                "student_id": student_id,
                "state": AttemptState::InProgress.as_str(),
            })
            .await?;
        Ok(attempt)
    }

    async fn find_current(
        &self,
        student_id: &str,
        variant: QuizVariant,
    ) -> AppResult<Option<Attempt>> {
        let in_progress = self
            .attempts
            .find_one(doc! {
                "student_id": student_id,
                "variant": variant.as_str(),
                "state": AttemptState::InProgress.as_str(),
            })
            .await?;
        if in_progress.is_some() {
            return Ok(in_progress);
        }

        let blocking = self
            .attempts
            .find_one(doc! {
                "student_id": student_id,
                "variant": variant.as_str(),
                "state": { "$in": [
                    AttemptState::Completed.as_str(),
                    AttemptState::Cheating.as_str(),
                ] },
            })
            .sort(doc! { "started_at": -1 })
            .await?;
        Ok(blocking)
    }

    async fn find_by_student_and_variant(
        &self,
        student_id: &str,
        variant: QuizVariant,
    ) -> AppResult<Vec<Attempt>> {
        let attempts = self
            .attempts
            .find(doc! {
                "student_id": student_id,
                "variant": variant.as_str(),
            })
            .sort(doc! { "started_at": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(attempts)
    }

    async fn save_progress(&self, attempt_id: &str, elapsed_seconds: i64) -> AppResult<()> {
        let result = self
            .attempts
            .update_one(
                doc! {
                    "id": attempt_id,
                    "state": AttemptState::InProgress.as_str(),
                },
                doc! { "$set": {
                    "completion_seconds": elapsed_seconds,
                    "modified_at": bson::to_bson(&Utc::now())?,
                } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::InvalidTransition(format!(
                "attempt '{}' is not in progress",
                attempt_id
            )));
        }
        Ok(())
    }

    async fn record_heartbeat(&self, attempt_id: &str, at: DateTime<Utc>) -> AppResult<()> {
        let result = self
            .attempts
            .update_one(
                doc! {
                    "id": attempt_id,
                    "state": AttemptState::InProgress.as_str(),
                },
                doc! { "$set": {
                    "last_heartbeat_at": bson::to_bson(&at)?,
                    "modified_at": bson::to_bson(&at)?,
                } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(AppError::InvalidTransition(format!(
                "attempt '{}' is not in progress",
                attempt_id
            )));
        }
        Ok(())
    }

    async fn upsert_answer(&self, record: AnswerRecord) -> AppResult<()> {
        let created_at = record.created_at.unwrap_or_else(Utc::now);
        let result = self
            .answers
            .update_one(
                doc! {
                    "attempt_id": &record.attempt_id,
                    "question_index": record.question_index,
                    "graded": { "$ne": true },
                },
                doc! {
                    "$set": {
                        "student_answer": &record.student_answer,
                        "kind": bson::to_bson(&record.kind)?,
                        "modified_at": bson::to_bson(&Utc::now())?,
                    },
                    "$setOnInsert": {
                        "id": &record.id,
                        "is_correct": false,
                        "points_earned": 0.0,
                        "graded": false,
                        "created_at": bson::to_bson(&created_at)?,
                    },
                },
            )
            .upsert(true)
            .await;

        match result {
            Ok(_) => Ok(()),
            // The slot exists but is graded: the filter missed it and the
            // upsert collided with the answer_slot index. Drop the write.
            Err(err) if is_duplicate_key(&err) => {
                log::warn!(
                    "Dropping late write to graded answer slot {} of attempt '{}'",
                    record.question_index,
                    record.attempt_id
                );
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn replace_graded_answers(
        &self,
        attempt_id: &str,
        records: Vec<AnswerRecord>,
    ) -> AppResult<()> {
        for record in &records {
            self.answers
                .replace_one(
                    doc! {
                        "attempt_id": attempt_id,
                        "question_index": record.question_index,
                    },
                    record,
                )
                .upsert(true)
                .await?;
        }
        Ok(())
    }

    async fn list_answers(&self, attempt_id: &str) -> AppResult<Vec<AnswerRecord>> {
        let records = self
            .answers
            .find(doc! { "attempt_id": attempt_id })
            .sort(doc! { "question_index": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(records)
    }

    async fn transition_state(
        &self,
        attempt_id: &str,
        from_allowed: &[AttemptState],
        to: AttemptState,
        outcome: Option<AttemptOutcome>,
    ) -> AppResult<Attempt> {
        let from: Vec<&str> = from_allowed.iter().map(|state| state.as_str()).collect();

        let mut set = doc! {
            "state": to.as_str(),
            "modified_at": bson::to_bson(&Utc::now())?,
        };
        if let Some(outcome) = outcome {
            set.insert("score", outcome.score);
            set.insert("correct_count", outcome.correct_count);
            set.insert("incorrect_count", outcome.incorrect_count);
            set.insert("total_questions", outcome.total_questions);
            set.insert("completion_seconds", outcome.completion_seconds);
            if let Some(completed_at) = outcome.completed_at {
                set.insert("completed_at", bson::to_bson(&completed_at)?);
            }
            if let Some(reason) = outcome.cheating_reason {
                set.insert("cheating_reason", reason.as_str());
            }
        }

        let updated = self
            .attempts
            .find_one_and_update(
                doc! { "id": attempt_id, "state": { "$in": from } },
                doc! { "$set": set },
            )
            .return_document(ReturnDocument::After)
            .await?;

        updated.ok_or_else(|| {
            AppError::InvalidTransition(format!(
                "attempt '{}' cannot move to {}",
                attempt_id, to
            ))
        })
    }

    async fn delete_answers(&self, attempt_id: &str) -> AppResult<u64> {
        let result = self
            .answers
            .delete_many(doc! { "attempt_id": attempt_id })
            .await?;
        Ok(result.deleted_count)
    }

    async fn find_completed_for_ranking(
        &self,
        variant: QuizVariant,
        student_filter: Option<&[String]>,
    ) -> AppResult<Vec<Attempt>> {
        let mut filter = doc! {
            "variant": variant.as_str(),
            "state": AttemptState::Completed.as_str(),
        };
        if let Some(students) = student_filter {
            filter.insert("student_id", doc! { "$in": students.to_vec() });
        }

        let attempts = self.attempts.find(filter).await?.try_collect().await?;
        Ok(attempts)
    }

    async fn find_stale_in_progress(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Attempt>> {
        // Timestamps are stored in RFC 3339 string form, so the staleness
        // comparison happens here rather than in a Mongo filter.
        let in_progress: Vec<Attempt> = self
            .attempts
            .find(doc! { "state": AttemptState::InProgress.as_str() })
            .await?
            .try_collect()
            .await?;

        Ok(in_progress
            .into_iter()
            .filter(|attempt| attempt.last_seen_at() < cutoff)
            .collect())
    }
}
