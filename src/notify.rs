//! Notification boundary — best-effort publish of human-readable events.
//!
//! Failures here never roll back or re-trigger an already-committed action
//! or audit entry; the dispatcher logs them and moves on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::NotifyError;

/// Evidence cap for the quoted post body in outbound payloads.
const MAX_EVIDENCE_CHARS: usize = 1024;

/// One human-readable moderation event.
#[derive(Debug, Clone, Serialize)]
pub struct ModerationEvent {
    pub group_id: u64,
    pub post_id: u64,
    pub subject_user_id: u64,
    pub subject_username: String,
    /// Action label: "deletion", "exile", "demotion", "rankchange".
    pub action: String,
    pub reason: String,
    /// Supplementary detail, e.g. "Demoted from Officer to Member".
    pub detail: Option<String>,
    /// The offending post, truncated.
    pub evidence: String,
    pub timestamp: DateTime<Utc>,
}

impl ModerationEvent {
    /// Truncate the evidence body to the payload cap.
    pub fn with_evidence(mut self, body: &str) -> Self {
        self.evidence = if body.chars().count() > MAX_EVIDENCE_CHARS {
            let cut: String = body.chars().take(MAX_EVIDENCE_CHARS - 3).collect();
            format!("{cut}...")
        } else {
            body.to_string()
        };
        self
    }
}

/// Fire-and-forget notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish an event to the front-end channel identified by `target`.
    async fn publish(&self, target: &str, event: &ModerationEvent) -> Result<(), NotifyError>;
}

/// Posts events as JSON to a per-target webhook URL.
///
/// `target` is interpolated into the configured URL template in place of
/// `{target}`; a template without the placeholder posts everything to one
/// endpoint, and an empty template disables publishing entirely.
pub struct WebhookNotifier {
    url_template: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url_template: String) -> Self {
        Self {
            url_template,
            client: reqwest::Client::new(),
        }
    }

    fn url_for(&self, target: &str) -> String {
        self.url_template.replace("{target}", target)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, target: &str, event: &ModerationEvent) -> Result<(), NotifyError> {
        if self.url_template.is_empty() {
            tracing::debug!(target, "Webhook disabled, dropping event");
            return Ok(());
        }
        let response = self
            .client
            .post(self.url_for(target))
            .json(event)
            .send()
            .await
            .map_err(|e| NotifyError::PublishFailed {
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(NotifyError::PublishFailed {
                target: target.to_string(),
                reason: format!("webhook returned {}", response.status()),
            });
        }
        Ok(())
    }
}
