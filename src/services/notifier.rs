use async_trait::async_trait;

use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::models::domain::Attempt;

/// Downstream hook fired after an attempt completes. Delivery is best-effort:
/// the caller spawns it off the submit path and only logs failures.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn quiz_completed(&self, attempt: &Attempt) -> AppResult<()>;
}

pub struct HttpCompletionNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl HttpCompletionNotifier {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: config.completion_webhook_url.clone(),
        }
    }
}

#[async_trait]
impl CompletionNotifier for HttpCompletionNotifier {
    async fn quiz_completed(&self, attempt: &Attempt) -> AppResult<()> {
        let Some(url) = self.webhook_url.as_deref() else {
            log::debug!(
                "No completion webhook configured, skipping notification for attempt '{}'",
                attempt.id
            );
            return Ok(());
        };

        let payload = serde_json::json!({
            "event": "quiz_completed",
            "attempt_id": attempt.id,
            "student_id": attempt.student_id,
            "variant": attempt.variant.as_str(),
            "score": attempt.score,
            "correct_count": attempt.correct_count,
            "total_questions": attempt.total_questions,
            "completion_seconds": attempt.completion_seconds,
            "completed_at": attempt.completed_at,
        });

        let response = self.client.post(url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "completion webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
