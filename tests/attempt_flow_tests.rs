use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};

use aralin_server::{
    errors::{AppError, AppResult},
    models::{
        domain::{
            AnswerRecord, Attempt, AttemptOutcome, AttemptState, CheatReason, QuestionKind,
            QuizVariant,
        },
        dto::request::AnswerInput,
    },
    repositories::AttemptStore,
    services::{
        answer_key::variant_spec,
        attempt_lifecycle_service::AttemptLifecycleService,
        class_directory::{ClassDirectory, RosterEntry},
        disengagement_service::DisengagementMonitor,
        leaderboard_service::{LeaderboardScope, LeaderboardService},
        notifier::CompletionNotifier,
    },
};

const STALE_AFTER_SECS: i64 = 7200;

struct InMemoryAttemptStore {
    attempts: Arc<RwLock<HashMap<String, Attempt>>>,
    answers: Arc<RwLock<HashMap<(String, i32), AnswerRecord>>>,
}

impl InMemoryAttemptStore {
    fn new() -> Self {
        Self {
            attempts: Arc::new(RwLock::new(HashMap::new())),
            answers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Rewind an attempt's liveness signal so sweep tests do not have to
    /// sleep through the real staleness window.
    async fn backdate(&self, attempt_id: &str, last_seen: DateTime<Utc>) {
        let mut attempts = self.attempts.write().await;
        if let Some(attempt) = attempts.get_mut(attempt_id) {
            attempt.started_at = last_seen;
            attempt.last_heartbeat_at = None;
        }
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn create_attempt(&self, attempt: Attempt) -> AppResult<Attempt> {
        // Check and insert under one write lock, the same all-or-nothing
        // guarantee the partial unique index gives the Mongo store.
        let mut attempts = self.attempts.write().await;
        let blocking = attempts.values().find(|existing| {
            existing.student_id == attempt.student_id
                && existing.state == AttemptState::InProgress
        });
        if let Some(existing) = blocking {
            return Err(AppError::AttemptInProgress(format!(
                "attempt '{}' on '{}' is still in progress",
                existing.id, existing.variant
            )));
        }
        attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(attempt)
    }

    async fn find_by_id(&self, attempt_id: &str) -> AppResult<Option<Attempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts.get(attempt_id).cloned())
    }

    async fn find_in_progress(&self, student_id: &str) -> AppResult<Option<Attempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts
            .values()
            .find(|a| a.student_id == student_id && a.state == AttemptState::InProgress)
            .cloned())
    }

    async fn find_current(
        &self,
        student_id: &str,
        variant: QuizVariant,
    ) -> AppResult<Option<Attempt>> {
        let attempts = self.attempts.read().await;
        let in_progress = attempts.values().find(|a| {
            a.student_id == student_id
                && a.variant == variant
                && a.state == AttemptState::InProgress
        });
        if let Some(found) = in_progress {
            return Ok(Some(found.clone()));
        }

        Ok(attempts
            .values()
            .filter(|a| {
                a.student_id == student_id
                    && a.variant == variant
                    && matches!(a.state, AttemptState::Completed | AttemptState::Cheating)
            })
            .max_by_key(|a| a.started_at)
            .cloned())
    }

    async fn find_by_student_and_variant(
        &self,
        student_id: &str,
        variant: QuizVariant,
    ) -> AppResult<Vec<Attempt>> {
        let attempts = self.attempts.read().await;
        let mut items: Vec<_> = attempts
            .values()
            .filter(|a| a.student_id == student_id && a.variant == variant)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(items)
    }

    async fn save_progress(&self, attempt_id: &str, elapsed_seconds: i64) -> AppResult<()> {
        let mut attempts = self.attempts.write().await;
        match attempts.get_mut(attempt_id) {
            Some(attempt) if attempt.state == AttemptState::InProgress => {
                attempt.completion_seconds = elapsed_seconds;
                attempt.modified_at = Some(Utc::now());
                Ok(())
            }
            _ => Err(AppError::InvalidTransition(format!(
                "attempt '{}' is not in progress",
                attempt_id
            ))),
        }
    }

    async fn record_heartbeat(&self, attempt_id: &str, at: DateTime<Utc>) -> AppResult<()> {
        let mut attempts = self.attempts.write().await;
        match attempts.get_mut(attempt_id) {
            Some(attempt) if attempt.state == AttemptState::InProgress => {
                attempt.last_heartbeat_at = Some(at);
                attempt.modified_at = Some(at);
                Ok(())
            }
            _ => Err(AppError::InvalidTransition(format!(
                "attempt '{}' is not in progress",
                attempt_id
            ))),
        }
    }

    async fn upsert_answer(&self, record: AnswerRecord) -> AppResult<()> {
        let mut answers = self.answers.write().await;
        let key = (record.attempt_id.clone(), record.question_index);
        if answers.get(&key).map(|row| row.graded).unwrap_or(false) {
            // Graded rows are immutable; the late write is dropped.
            return Ok(());
        }
        answers.insert(key, record);
        Ok(())
    }

    async fn replace_graded_answers(
        &self,
        attempt_id: &str,
        records: Vec<AnswerRecord>,
    ) -> AppResult<()> {
        let mut answers = self.answers.write().await;
        for record in records {
            answers.insert((attempt_id.to_string(), record.question_index), record);
        }
        Ok(())
    }

    async fn list_answers(&self, attempt_id: &str) -> AppResult<Vec<AnswerRecord>> {
        let answers = self.answers.read().await;
        let mut items: Vec<_> = answers
            .values()
            .filter(|row| row.attempt_id == attempt_id)
            .cloned()
            .collect();
        items.sort_by_key(|row| row.question_index);
        Ok(items)
    }

    async fn transition_state(
        &self,
        attempt_id: &str,
        from_allowed: &[AttemptState],
        to: AttemptState,
        outcome: Option<AttemptOutcome>,
    ) -> AppResult<Attempt> {
        let mut attempts = self.attempts.write().await;
        let matched = attempts
            .get_mut(attempt_id)
            .filter(|attempt| from_allowed.contains(&attempt.state));

        let Some(attempt) = matched else {
            return Err(AppError::InvalidTransition(format!(
                "attempt '{}' cannot move to {}",
                attempt_id, to
            )));
        };

        attempt.state = to;
        attempt.modified_at = Some(Utc::now());
        if let Some(outcome) = outcome {
            attempt.score = outcome.score;
            attempt.correct_count = outcome.correct_count;
            attempt.incorrect_count = outcome.incorrect_count;
            attempt.total_questions = outcome.total_questions;
            attempt.completion_seconds = outcome.completion_seconds;
            if outcome.completed_at.is_some() {
                attempt.completed_at = outcome.completed_at;
            }
            if outcome.cheating_reason.is_some() {
                attempt.cheating_reason = outcome.cheating_reason;
            }
        }
        Ok(attempt.clone())
    }

    async fn delete_answers(&self, attempt_id: &str) -> AppResult<u64> {
        let mut answers = self.answers.write().await;
        let before = answers.len();
        answers.retain(|(owner, _), _| owner != attempt_id);
        Ok((before - answers.len()) as u64)
    }

    async fn find_completed_for_ranking(
        &self,
        variant: QuizVariant,
        student_filter: Option<&[String]>,
    ) -> AppResult<Vec<Attempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts
            .values()
            .filter(|a| a.variant == variant && a.state == AttemptState::Completed)
            .filter(|a| {
                student_filter
                    .map(|students| students.contains(&a.student_id))
                    .unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn find_stale_in_progress(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Attempt>> {
        let attempts = self.attempts.read().await;
        Ok(attempts
            .values()
            .filter(|a| a.state == AttemptState::InProgress && a.last_seen_at() < cutoff)
            .cloned()
            .collect())
    }
}

struct StaticDirectory {
    teacher_by_student: HashMap<String, String>,
    class_owner: HashMap<String, String>,
    roster: HashMap<String, Vec<RosterEntry>>,
    names: HashMap<String, String>,
}

impl StaticDirectory {
    fn empty() -> Self {
        Self {
            teacher_by_student: HashMap::new(),
            class_owner: HashMap::new(),
            roster: HashMap::new(),
            names: HashMap::new(),
        }
    }
}

#[async_trait]
impl ClassDirectory for StaticDirectory {
    async fn teacher_for_student(&self, student_id: &str) -> AppResult<Option<String>> {
        Ok(self.teacher_by_student.get(student_id).cloned())
    }

    async fn class_owned_by(&self, teacher_id: &str, class_id: &str) -> AppResult<bool> {
        Ok(self
            .class_owner
            .get(class_id)
            .map(|owner| owner == teacher_id)
            .unwrap_or(false))
    }

    async fn roster_for_teacher(
        &self,
        teacher_id: &str,
        _class_id: Option<&str>,
    ) -> AppResult<Vec<RosterEntry>> {
        Ok(self.roster.get(teacher_id).cloned().unwrap_or_default())
    }

    async fn display_names(
        &self,
        student_ids: &[String],
    ) -> AppResult<HashMap<String, String>> {
        Ok(self
            .names
            .iter()
            .filter(|(id, _)| student_ids.contains(id))
            .map(|(id, name)| (id.clone(), name.clone()))
            .collect())
    }
}

struct FailingDirectory;

#[async_trait]
impl ClassDirectory for FailingDirectory {
    async fn teacher_for_student(&self, _student_id: &str) -> AppResult<Option<String>> {
        Err(AppError::UpstreamUnavailable(
            "class directory offline".to_string(),
        ))
    }

    async fn class_owned_by(&self, _teacher_id: &str, _class_id: &str) -> AppResult<bool> {
        Err(AppError::UpstreamUnavailable(
            "class directory offline".to_string(),
        ))
    }

    async fn roster_for_teacher(
        &self,
        _teacher_id: &str,
        _class_id: Option<&str>,
    ) -> AppResult<Vec<RosterEntry>> {
        Err(AppError::UpstreamUnavailable(
            "class directory offline".to_string(),
        ))
    }

    async fn display_names(
        &self,
        _student_ids: &[String],
    ) -> AppResult<HashMap<String, String>> {
        Err(AppError::UpstreamUnavailable(
            "class directory offline".to_string(),
        ))
    }
}

struct RecordingNotifier {
    completed: Arc<RwLock<Vec<String>>>,
    fired: Arc<Notify>,
}

impl RecordingNotifier {
    fn new() -> Self {
        Self {
            completed: Arc::new(RwLock::new(Vec::new())),
            fired: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn quiz_completed(&self, attempt: &Attempt) -> AppResult<()> {
        self.completed.write().await.push(attempt.id.clone());
        self.fired.notify_one();
        Ok(())
    }
}

struct NullNotifier;

#[async_trait]
impl CompletionNotifier for NullNotifier {
    async fn quiz_completed(&self, _attempt: &Attempt) -> AppResult<()> {
        Ok(())
    }
}

fn lifecycle_with(
    store: Arc<InMemoryAttemptStore>,
    directory: Arc<dyn ClassDirectory>,
    notifier: Arc<dyn CompletionNotifier>,
) -> Arc<AttemptLifecycleService> {
    Arc::new(AttemptLifecycleService::new(store, directory, notifier))
}

fn plain_lifecycle(store: Arc<InMemoryAttemptStore>) -> Arc<AttemptLifecycleService> {
    lifecycle_with(store, Arc::new(StaticDirectory::empty()), Arc::new(NullNotifier))
}

fn entry(student_id: &str, display_name: &str) -> RosterEntry {
    RosterEntry {
        student_id: student_id.to_string(),
        display_name: display_name.to_string(),
    }
}

fn choice(question_index: i32, answer: &str) -> AnswerInput {
    AnswerInput {
        question_index,
        kind: QuestionKind::MultipleChoice,
        answer: answer.to_string(),
    }
}

fn free_response(question_index: i32, answer: &str) -> AnswerInput {
    AnswerInput {
        question_index,
        kind: QuestionKind::ProblemSolving,
        answer: answer.to_string(),
    }
}

/// Answers for a variant with the first `correct_choices` multiple-choice
/// slots right, the rest wrong, and the given free-response text.
fn answer_sheet(variant: QuizVariant, correct_choices: usize, ps_answer: &str) -> Vec<AnswerInput> {
    let spec = variant_spec(variant).expect("variant registered");
    let mut answers: Vec<AnswerInput> = spec
        .multiple_choice_key()
        .iter()
        .enumerate()
        .map(|(offset, key)| {
            let index = offset as i32 + 1;
            if offset < correct_choices {
                choice(index, key)
            } else {
                choice(index, "x")
            }
        })
        .collect();
    if let Some(index) = spec.problem_solving_index() {
        answers.push(free_response(index, ps_answer));
    }
    answers
}

async fn seed_completed(
    store: &InMemoryAttemptStore,
    student_id: &str,
    variant: QuizVariant,
    score: i32,
    completion_seconds: i64,
) -> Attempt {
    let attempt = store
        .create_attempt(Attempt::start(student_id, variant, 11))
        .await
        .expect("create attempt");
    store
        .transition_state(
            &attempt.id,
            &[AttemptState::InProgress],
            AttemptState::Completed,
            Some(AttemptOutcome {
                score,
                correct_count: score.min(11),
                incorrect_count: 11 - score.min(11),
                total_questions: 11,
                completion_seconds,
                completed_at: Some(Utc::now()),
                cheating_reason: None,
            }),
        )
        .await
        .expect("complete attempt")
}

#[tokio::test]
async fn second_start_is_rejected_while_any_attempt_is_in_progress() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let lifecycle = plain_lifecycle(store.clone());

    let first = lifecycle
        .start("student-1", QuizVariant::Functions)
        .await
        .expect("first start succeeds");
    assert_eq!(first.state, AttemptState::InProgress);
    assert_eq!(first.total_questions, 11);

    let same_variant = lifecycle.start("student-1", QuizVariant::Functions).await;
    assert!(matches!(same_variant, Err(AppError::AttemptInProgress(_))));

    // An in-progress attempt blocks every variant, not just its own.
    let other_variant = lifecycle
        .start("student-1", QuizVariant::EvaluatingFunctions)
        .await;
    assert!(matches!(other_variant, Err(AppError::AttemptInProgress(_))));

    let unrelated = lifecycle
        .start("student-2", QuizVariant::Functions)
        .await
        .expect("other students are unaffected");
    assert_eq!(unrelated.student_id, "student-2");
}

#[tokio::test]
async fn concurrent_starts_resolve_to_one_winner() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let lifecycle = plain_lifecycle(store.clone());

    let (left, right) = tokio::join!(
        lifecycle.start("student-1", QuizVariant::Functions),
        lifecycle.start("student-1", QuizVariant::Functions),
    );

    let wins = [&left, &right].iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one of two racing starts may win");

    let loser = if left.is_err() { left } else { right };
    assert!(matches!(loser, Err(AppError::AttemptInProgress(_))));

    let active = store
        .find_in_progress("student-1")
        .await
        .expect("query works")
        .expect("winner's attempt is stored");
    assert_eq!(active.state, AttemptState::InProgress);
}

#[tokio::test]
async fn submit_grades_a_mixed_answer_set() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let lifecycle = lifecycle_with(
        store.clone(),
        Arc::new(StaticDirectory::empty()),
        notifier.clone(),
    );

    let attempt = lifecycle
        .start("student-1", QuizVariant::EvaluatingFunctions)
        .await
        .expect("start succeeds");

    // Seven of ten choices right plus an exact free-response answer.
    let result = lifecycle
        .submit(
            "student-1",
            &attempt.id,
            &answer_sheet(QuizVariant::EvaluatingFunctions, 7, "22"),
            540,
        )
        .await
        .expect("submit succeeds");

    assert_eq!(result.score, 9);
    assert_eq!(result.correct_answers, 8);
    assert_eq!(result.incorrect_answers, 3);
    assert_eq!(result.total_questions, 11);
    assert_eq!(result.completion_seconds, 540);
    assert!((result.percentage - 75.0).abs() < f64::EPSILON);
    assert_eq!(result.detailed_results.len(), 11);

    let stored = store
        .find_by_id(&attempt.id)
        .await
        .expect("query works")
        .expect("attempt exists");
    assert_eq!(stored.state, AttemptState::Completed);
    assert_eq!(stored.score, 9);
    assert!(stored.completed_at.is_some());

    let rows = store.list_answers(&attempt.id).await.expect("query works");
    assert_eq!(rows.len(), 11);
    assert!(rows.iter().all(|row| row.graded));
    let ps_row = rows.last().expect("free-response row present");
    assert_eq!(ps_row.kind, QuestionKind::ProblemSolving);
    assert!(ps_row.is_correct);

    tokio::time::timeout(Duration::from_secs(1), notifier.fired.notified())
        .await
        .expect("completion notification fires");
    let completed = notifier.completed.read().await;
    assert_eq!(completed.as_slice(), [attempt.id.clone()]);
}

#[tokio::test]
async fn double_submit_keeps_the_first_result() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let lifecycle = plain_lifecycle(store.clone());

    let attempt = lifecycle
        .start("student-1", QuizVariant::EvaluatingFunctions)
        .await
        .expect("start succeeds");

    let first = lifecycle
        .submit(
            "student-1",
            &attempt.id,
            &answer_sheet(QuizVariant::EvaluatingFunctions, 10, "22"),
            300,
        )
        .await
        .expect("first submit succeeds");
    assert_eq!(first.score, 12);
    assert!((first.percentage - 100.0).abs() < f64::EPSILON);

    let second = lifecycle
        .submit(
            "student-1",
            &attempt.id,
            &answer_sheet(QuizVariant::EvaluatingFunctions, 0, "999"),
            301,
        )
        .await;
    assert!(matches!(second, Err(AppError::InvalidTransition(_))));

    let stored = store
        .find_by_id(&attempt.id)
        .await
        .expect("query works")
        .expect("attempt exists");
    assert_eq!(stored.score, 12, "losing submit must not touch the score");
    assert_eq!(stored.completion_seconds, 300);
}

#[tokio::test]
async fn late_saves_after_submit_change_nothing() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let lifecycle = plain_lifecycle(store.clone());

    let attempt = lifecycle
        .start("student-1", QuizVariant::EvaluatingFunctions)
        .await
        .expect("start succeeds");
    lifecycle
        .submit(
            "student-1",
            &attempt.id,
            &answer_sheet(QuizVariant::EvaluatingFunctions, 10, "22"),
            300,
        )
        .await
        .expect("submit succeeds");

    let late = lifecycle
        .save_progress("student-1", &attempt.id, &[choice(1, "d")], 999)
        .await;
    assert!(matches!(late, Err(AppError::InvalidTransition(_))));

    // Even a direct store write cannot overwrite a graded row.
    store
        .upsert_answer(AnswerRecord::ungraded(
            &attempt.id,
            1,
            QuestionKind::MultipleChoice,
            "d",
        ))
        .await
        .expect("late write is dropped, not an error");

    let rows = store.list_answers(&attempt.id).await.expect("query works");
    let first_row = rows.first().expect("row for question 1");
    assert!(first_row.graded);
    assert_eq!(first_row.student_answer, "b");

    let stored = store
        .find_by_id(&attempt.id)
        .await
        .expect("query works")
        .expect("attempt exists");
    assert_eq!(stored.completion_seconds, 300);
}

#[tokio::test]
async fn save_progress_drops_malformed_answers_but_rejects_all_bad_sets() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let lifecycle = plain_lifecycle(store.clone());

    let attempt = lifecycle
        .start("student-1", QuizVariant::Functions)
        .await
        .expect("start succeeds");

    let partial = lifecycle
        .save_progress(
            "student-1",
            &attempt.id,
            &[choice(1, "a"), choice(99, "b")],
            120,
        )
        .await
        .expect("mixed set saves the valid part");
    assert_eq!(partial.saved, 1);
    assert_eq!(partial.rejected, 1);

    let rows = store.list_answers(&attempt.id).await.expect("query works");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].question_index, 1);
    assert!(!rows[0].graded);

    let all_bad = lifecycle
        .save_progress(
            "student-1",
            &attempt.id,
            &[choice(99, "b"), free_response(1, "22")],
            180,
        )
        .await;
    assert!(matches!(all_bad, Err(AppError::InvalidQuestionIndex(_))));

    // The refused write must not have advanced the clock either.
    let stored = store
        .find_by_id(&attempt.id)
        .await
        .expect("query works")
        .expect("attempt exists");
    assert_eq!(stored.completion_seconds, 120);

    let foreign = lifecycle
        .save_progress("student-2", &attempt.id, &[choice(1, "a")], 60)
        .await;
    assert!(matches!(foreign, Err(AppError::NotAuthorized(_))));
}

#[tokio::test]
async fn sweep_abandons_quiet_attempts_but_spares_heartbeating_ones() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let lifecycle = plain_lifecycle(store.clone());
    let monitor = DisengagementMonitor::new(
        lifecycle.clone(),
        store.clone(),
        STALE_AFTER_SECS,
    );

    let live = lifecycle
        .start("student-live", QuizVariant::Functions)
        .await
        .expect("start succeeds");
    let quiet = lifecycle
        .start("student-quiet", QuizVariant::Functions)
        .await
        .expect("start succeeds");

    let three_hours_ago = Utc::now() - chrono::Duration::hours(3);
    store.backdate(&live.id, three_hours_ago).await;
    store.backdate(&quiet.id, three_hours_ago).await;

    monitor
        .heartbeat("student-live", &live.id)
        .await
        .expect("heartbeat succeeds");

    let summary = monitor.sweep(Utc::now()).await.expect("sweep succeeds");
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.abandoned, 1);

    let live_after = store
        .find_by_id(&live.id)
        .await
        .expect("query works")
        .expect("attempt exists");
    assert_eq!(live_after.state, AttemptState::InProgress);

    let quiet_after = store
        .find_by_id(&quiet.id)
        .await
        .expect("query works")
        .expect("attempt exists");
    assert_eq!(quiet_after.state, AttemptState::Abandoned);
    assert_eq!(quiet_after.cheating_reason, None, "a timeout is not cheating");

    // Abandonment costs the attempt, nothing more: the student can restart.
    lifecycle
        .start("student-quiet", QuizVariant::Functions)
        .await
        .expect("restart after abandonment succeeds");

    // And the abandoned attempt never reaches the board.
    let leaderboard = LeaderboardService::new(store.clone(), Arc::new(StaticDirectory::empty()));
    let board = leaderboard
        .rank(QuizVariant::Functions, None, 20, None)
        .await
        .expect("ranking succeeds");
    assert!(board.entries.is_empty());
}

#[tokio::test]
async fn cheating_report_forces_zero_and_blocks_retakes() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let lifecycle = plain_lifecycle(store.clone());
    let monitor = DisengagementMonitor::new(
        lifecycle.clone(),
        store.clone(),
        STALE_AFTER_SECS,
    );

    let attempt = lifecycle
        .start("student-1", QuizVariant::RationalFunctions)
        .await
        .expect("start succeeds");

    // A perfect sheet is already saved when the client reports a tab switch.
    lifecycle
        .save_progress(
            "student-1",
            &attempt.id,
            &answer_sheet(
                QuizVariant::RationalFunctions,
                10,
                "undefined where the denominator is zero",
            ),
            240,
        )
        .await
        .expect("save succeeds");

    let foreign = monitor
        .report("student-2", &attempt.id, CheatReason::TabSwitch)
        .await;
    assert!(matches!(foreign, Err(AppError::NotAuthorized(_))));

    let ack = monitor
        .report("student-1", &attempt.id, CheatReason::TabSwitch)
        .await
        .expect("report succeeds");
    assert_eq!(ack.score, 0);
    assert!(ack.cheating_detected);

    let flagged = store
        .find_by_id(&attempt.id)
        .await
        .expect("query works")
        .expect("attempt exists");
    assert_eq!(flagged.state, AttemptState::Cheating);
    assert_eq!(flagged.score, 0);
    assert_eq!(flagged.correct_count, 0);
    assert_eq!(flagged.incorrect_count, 11);
    assert_eq!(flagged.cheating_reason, Some(CheatReason::TabSwitch));

    // The saved sheet stays behind ungraded for the teacher to inspect.
    let rows = store.list_answers(&attempt.id).await.expect("query works");
    assert_eq!(rows.len(), 11);
    assert!(rows.iter().all(|row| !row.graded));

    let retake = lifecycle
        .start("student-1", QuizVariant::RationalFunctions)
        .await;
    assert!(matches!(retake, Err(AppError::QuizAlreadyCompleted(_))));

    let board = LeaderboardService::new(store.clone(), Arc::new(StaticDirectory::empty()))
        .rank(QuizVariant::RationalFunctions, None, 20, None)
        .await
        .expect("ranking succeeds");
    assert!(board.entries.is_empty(), "cheating attempts never rank");
}

#[tokio::test]
async fn reset_is_limited_to_the_assigned_teacher() {
    let store = Arc::new(InMemoryAttemptStore::new());
    let mut directory = StaticDirectory::empty();
    directory
        .teacher_by_student
        .insert("student-1".to_string(), "teacher-a".to_string());
    let lifecycle = lifecycle_with(store.clone(), Arc::new(directory), Arc::new(NullNotifier));

    let attempt = lifecycle
        .start("student-1", QuizVariant::RealLifeProblems)
        .await
        .expect("start succeeds");
    lifecycle
        .submit(
            "student-1",
            &attempt.id,
            &answer_sheet(QuizVariant::RealLifeProblems, 10, "148"),
            400,
        )
        .await
        .expect("submit succeeds");

    let blocked = lifecycle
        .start("student-1", QuizVariant::RealLifeProblems)
        .await;
    assert!(matches!(blocked, Err(AppError::QuizAlreadyCompleted(_))));

    let foreign = lifecycle
        .reset_student_quiz("teacher-b", "student-1", QuizVariant::RealLifeProblems)
        .await;
    assert!(matches!(foreign, Err(AppError::NotAuthorized(_))));

    let reset_count = lifecycle
        .reset_student_quiz("teacher-a", "student-1", QuizVariant::RealLifeProblems)
        .await
        .expect("assigned teacher may reset");
    assert_eq!(reset_count, 1);

    let retired = store
        .find_by_id(&attempt.id)
        .await
        .expect("query works")
        .expect("attempt exists");
    assert_eq!(retired.state, AttemptState::Reset);

    let rows = store.list_answers(&attempt.id).await.expect("query works");
    assert!(rows.is_empty(), "reset drops the answer rows");

    lifecycle
        .start("student-1", QuizVariant::RealLifeProblems)
        .await
        .expect("retake after reset succeeds");

    // A second reset finds nothing left to retire.
    let again = lifecycle
        .reset_student_quiz("teacher-a", "student-1", QuizVariant::RealLifeProblems)
        .await
        .expect("idempotent reset succeeds");
    assert_eq!(again, 0);
}

#[tokio::test]
async fn leaderboard_orders_dedupes_and_marks_the_viewer() {
    let store = Arc::new(InMemoryAttemptStore::new());

    // Functions tops out at 13 points: ten choices plus a three-step
    // free-response question.
    seed_completed(&store, "alice", QuizVariant::Functions, 13, 300).await;
    seed_completed(&store, "bob", QuizVariant::Functions, 13, 240).await;
    seed_completed(&store, "carol", QuizVariant::Functions, 9, 100).await;
    // Two finished runs for dave; only the better one may rank.
    seed_completed(&store, "dave", QuizVariant::Functions, 7, 200).await;
    seed_completed(&store, "dave", QuizVariant::Functions, 10, 500).await;
    // A different variant must not leak in.
    seed_completed(&store, "eve", QuizVariant::RationalFunctions, 12, 60).await;

    let mut directory = StaticDirectory::empty();
    directory
        .names
        .insert("alice".to_string(), "Alice A".to_string());
    directory
        .names
        .insert("bob".to_string(), "Bob B".to_string());

    let board = LeaderboardService::new(store.clone(), Arc::new(directory))
        .rank(QuizVariant::Functions, None, 20, Some("carol"))
        .await
        .expect("ranking succeeds");

    let summary: Vec<(usize, &str, i32)> = board
        .entries
        .iter()
        .map(|e| (e.rank, e.student_id.as_str(), e.score))
        .collect();
    assert_eq!(
        summary,
        vec![(1, "bob", 13), (2, "alice", 13), (3, "dave", 10), (4, "carol", 9)],
        "score first, faster completion breaks ties, one row per student"
    );

    assert!((board.entries[0].percentage - 100.0).abs() < f64::EPSILON);
    assert_eq!(board.entries[0].display_name, "Bob B");
    // Ids the directory does not know fall back to the raw id.
    assert_eq!(board.entries[3].display_name, "carol");

    let viewer_flags: Vec<bool> = board.entries.iter().map(|e| e.is_current_user).collect();
    assert_eq!(viewer_flags, vec![false, false, false, true]);

    let truncated = LeaderboardService::new(store.clone(), Arc::new(StaticDirectory::empty()))
        .rank(QuizVariant::Functions, None, 2, None)
        .await
        .expect("ranking succeeds");
    assert_eq!(truncated.entries.len(), 2);
    assert_eq!(truncated.entries[1].rank, 2);
}

#[tokio::test]
async fn scoped_leaderboard_filters_to_the_roster_and_renumbers() {
    let store = Arc::new(InMemoryAttemptStore::new());

    seed_completed(&store, "alice", QuizVariant::Functions, 12, 300).await;
    seed_completed(&store, "bob", QuizVariant::Functions, 12, 240).await;
    seed_completed(&store, "carol", QuizVariant::Functions, 9, 100).await;

    let mut directory = StaticDirectory::empty();
    directory
        .class_owner
        .insert("class-7a".to_string(), "teacher-a".to_string());
    directory.roster.insert(
        "teacher-a".to_string(),
        vec![entry("alice", "Alice A"), entry("carol", "Carol C")],
    );

    let service = LeaderboardService::new(store.clone(), Arc::new(directory));

    let board = service
        .rank(
            QuizVariant::Functions,
            Some(LeaderboardScope {
                teacher_id: "teacher-a",
                class_id: Some("class-7a"),
            }),
            20,
            None,
        )
        .await
        .expect("scoped ranking succeeds");

    // Bob outranks everyone globally but is not on this roster; ranks
    // restart at 1 after the filter.
    let summary: Vec<(usize, &str)> = board
        .entries
        .iter()
        .map(|e| (e.rank, e.student_id.as_str()))
        .collect();
    assert_eq!(summary, vec![(1, "alice"), (2, "carol")]);
    assert_eq!(board.entries[0].display_name, "Alice A");

    let foreign_class = service
        .rank(
            QuizVariant::Functions,
            Some(LeaderboardScope {
                teacher_id: "teacher-b",
                class_id: Some("class-7a"),
            }),
            20,
            None,
        )
        .await;
    assert!(matches!(foreign_class, Err(AppError::NotAuthorized(_))));
}

#[tokio::test]
async fn directory_outage_degrades_open_boards_but_fails_scoped_ones() {
    let store = Arc::new(InMemoryAttemptStore::new());
    seed_completed(&store, "alice", QuizVariant::Functions, 12, 300).await;

    let service = LeaderboardService::new(store.clone(), Arc::new(FailingDirectory));

    let open = service
        .rank(QuizVariant::Functions, None, 20, None)
        .await
        .expect("open board survives a directory outage");
    assert_eq!(open.entries.len(), 1);
    assert_eq!(open.entries[0].display_name, "alice");

    let scoped = service
        .rank(
            QuizVariant::Functions,
            Some(LeaderboardScope {
                teacher_id: "teacher-a",
                class_id: None,
            }),
            20,
            None,
        )
        .await;
    assert!(matches!(scoped, Err(AppError::UpstreamUnavailable(_))));
}
