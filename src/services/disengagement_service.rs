use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::errors::{AppError, AppResult};
use crate::models::domain::CheatReason;
use crate::models::dto::response::{CheatingAck, SweepSummary};
use crate::repositories::AttemptStore;
use crate::services::attempt_lifecycle_service::AttemptLifecycleService;

/// Watches attempts for signs the student walked away or broke the rules.
///
/// Two separate paths that are never conflated: an explicit client report
/// (logout, hidden tab) flags the attempt as cheating with a forced zero,
/// while the passive sweep merely abandons attempts whose heartbeats went
/// quiet, with no penalty beyond losing the attempt.
pub struct DisengagementMonitor {
    lifecycle: Arc<AttemptLifecycleService>,
    store: Arc<dyn AttemptStore>,
    stale_after_secs: i64,
}

impl DisengagementMonitor {
    pub fn new(
        lifecycle: Arc<AttemptLifecycleService>,
        store: Arc<dyn AttemptStore>,
        stale_after_secs: i64,
    ) -> Self {
        Self {
            lifecycle,
            store,
            stale_after_secs,
        }
    }

    pub async fn heartbeat(&self, student_id: &str, attempt_id: &str) -> AppResult<()> {
        self.lifecycle.heartbeat(student_id, attempt_id).await
    }

    /// Handle a client-side disengagement signal for the student's own
    /// attempt. The acknowledgement always reports the forced zero.
    pub async fn report(
        &self,
        student_id: &str,
        attempt_id: &str,
        reason: CheatReason,
    ) -> AppResult<CheatingAck> {
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

        let flagged = self.lifecycle.mark_cheating(attempt_id, reason).await?;

        Ok(CheatingAck {
            score: flagged.score,
            cheating_detected: true,
        })
    }

    /// One pass of the passive timeout path, for clients that crashed or
    /// vanished without a report.
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<SweepSummary> {
        let cutoff = now - Duration::seconds(self.stale_after_secs);
        let summary = self.lifecycle.abandon_stale(cutoff).await?;

        if summary.abandoned > 0 {
            log::info!(
                "Sweep abandoned {} of {} stale attempt(s)",
                summary.abandoned,
                summary.examined
            );
        }
        Ok(summary)
    }
}
