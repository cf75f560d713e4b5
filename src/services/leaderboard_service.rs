use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::errors::{AppError, AppResult};
use crate::models::domain::{Attempt, QuizVariant};
use crate::models::dto::response::{LeaderboardEntryDto, LeaderboardResponse};
use crate::repositories::AttemptStore;
use crate::services::answer_key::variant_spec;
use crate::services::class_directory::ClassDirectory;

/// Restrict a board to the requesting teacher's students, optionally to one
/// of their classes.
pub struct LeaderboardScope<'a> {
    pub teacher_id: &'a str,
    pub class_id: Option<&'a str>,
}

pub struct LeaderboardService {
    store: Arc<dyn AttemptStore>,
    directory: Arc<dyn ClassDirectory>,
}

impl LeaderboardService {
    pub fn new(store: Arc<dyn AttemptStore>, directory: Arc<dyn ClassDirectory>) -> Self {
        Self { store, directory }
    }

    /// Rank completed attempts for a variant.
    ///
    /// Only completed attempts are considered; abandoned, cheating and reset
    /// attempts never appear. Each student is represented once, by their best
    /// attempt. Ranks are 1-based positions assigned after the scope filter,
    /// so a class board always starts at rank 1.
    pub async fn rank(
        &self,
        variant: QuizVariant,
        scope: Option<LeaderboardScope<'_>>,
        limit: i64,
        viewer: Option<&str>,
    ) -> AppResult<LeaderboardResponse> {
        let mut roster_names: Option<HashMap<String, String>> = None;
        let student_filter: Option<Vec<String>> = match &scope {
            Some(scope) => {
                if let Some(class_id) = scope.class_id {
                    if !self
                        .directory
                        .class_owned_by(scope.teacher_id, class_id)
                        .await?
                    {
                        return Err(AppError::NotAuthorized(format!(
                            "class '{}' does not belong to teacher '{}'",
                            class_id, scope.teacher_id
                        )));
                    }
                }

                let roster = self
                    .directory
                    .roster_for_teacher(scope.teacher_id, scope.class_id)
                    .await?;
                roster_names = Some(
                    roster
                        .iter()
                        .map(|entry| (entry.student_id.clone(), entry.display_name.clone()))
                        .collect(),
                );
                Some(roster.into_iter().map(|entry| entry.student_id).collect())
            }
            None => None,
        };

        let completed = self
            .store
            .find_completed_for_ranking(variant, student_filter.as_deref())
            .await?;

        let mut ranked = Self::best_per_student(completed);
        ranked.truncate(limit.max(0) as usize);

        let names = match roster_names {
            Some(names) => names,
            // Names are cosmetic on the open board; if the directory is down
            // the ids still make a usable leaderboard.
            None => {
                let ids: Vec<String> = ranked.iter().map(|a| a.student_id.clone()).collect();
                match self.directory.display_names(&ids).await {
                    Ok(names) => names,
                    Err(err) => {
                        log::warn!("Display name lookup failed, falling back to ids: {}", err);
                        HashMap::new()
                    }
                }
            }
        };

        let max_points = variant_spec(variant)
            .map(|spec| spec.max_points())
            .unwrap_or(0.0);

        let entries = ranked
            .into_iter()
            .enumerate()
            .map(|(position, attempt)| {
                let display_name = names
                    .get(&attempt.student_id)
                    .cloned()
                    .unwrap_or_else(|| attempt.student_id.clone());
                let percentage = if max_points > 0.0 {
                    (attempt.score as f64 / max_points) * 100.0
                } else {
                    0.0
                };
                LeaderboardEntryDto {
                    rank: position + 1,
                    is_current_user: viewer == Some(attempt.student_id.as_str()),
                    display_name,
                    percentage,
                    score: attempt.score,
                    completion_seconds: attempt.completion_seconds,
                    student_id: attempt.student_id,
                }
            })
            .collect();

        Ok(LeaderboardResponse { variant, entries })
    }

    /// Deterministic board order: higher score first, faster completion
    /// breaks score ties, then completion time and student id settle the
    /// rest so identical inputs always produce identical boards.
    fn ranking_order(a: &Attempt, b: &Attempt) -> Ordering {
        b.score
            .cmp(&a.score)
            .then_with(|| a.completion_seconds.cmp(&b.completion_seconds))
            .then_with(|| a.completed_at.cmp(&b.completed_at))
            .then_with(|| a.student_id.cmp(&b.student_id))
    }

    /// Sort and keep each student's best attempt.
    fn best_per_student(mut attempts: Vec<Attempt>) -> Vec<Attempt> {
        attempts.sort_by(Self::ranking_order);
        let mut seen = HashSet::new();
        attempts
            .into_iter()
            .filter(|attempt| seen.insert(attempt.student_id.clone()))
            .collect()
    }
}
