//! Drain worker - delivers pending queue items

use crate::mail::{MailTransport, OutboundEmail};
use anfrage_common::config::QueueConfig;
use anfrage_common::types::QueueStatus;
use anfrage_common::Result;
use anfrage_storage::repository::{MailSettingsRepository, QueueRepository};
use chrono::Utc;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrainSummary {
    /// Items claimed by this pass
    pub claimed: usize,
    pub sent: usize,
    /// Failed sends that went back to `pending`
    pub retried: usize,
    /// Failed sends that exhausted their attempts
    pub failed: usize,
    /// Abandoned claims returned to the retry policy
    pub released: u64,
    /// Mail settings missing or inactive; nothing was touched
    pub skipped: bool,
    /// Logged in full; callers of the trigger endpoints only see the count
    #[serde(rename = "error_count", serialize_with = "serialize_count")]
    pub errors: Vec<String>,
}

/// Serialize a list as its length
pub(crate) fn serialize_count<S>(items: &[String], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(items.len() as u64)
}

/// Drains the outbound queue in single passes
pub struct DrainWorker {
    queue: Arc<dyn QueueRepository>,
    settings: Arc<dyn MailSettingsRepository>,
    transport: Arc<dyn MailTransport>,
    batch_size: i64,
    stale_after: chrono::Duration,
}

impl DrainWorker {
    pub fn new(
        queue: Arc<dyn QueueRepository>,
        settings: Arc<dyn MailSettingsRepository>,
        transport: Arc<dyn MailTransport>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            queue,
            settings,
            transport,
            batch_size: config.batch_size,
            stale_after: chrono::Duration::seconds(i64::from(
                u32::try_from(config.stale_after_secs).unwrap_or(u32::MAX),
            )),
        }
    }

    /// Run one pass.
    ///
    /// Only items pending when the pass starts are claimed, and each is sent
    /// at most once. Send and bookkeeping failures are recorded per item;
    /// only failing to load settings or to claim aborts the pass.
    pub async fn run_once(&self) -> Result<DrainSummary> {
        let mut summary = DrainSummary::default();

        let settings = match self.settings.get().await? {
            Some(s) if s.active => s,
            _ => {
                debug!("Mail settings inactive, skipping queue drain");
                summary.skipped = true;
                return Ok(summary);
            }
        };

        match self.queue.release_stale(Utc::now() - self.stale_after).await {
            Ok(released) => {
                if released > 0 {
                    warn!(released, "Released abandoned queue claims");
                }
                summary.released = released;
            }
            Err(e) => {
                error!(error = %e, "Failed to release stale claims");
                summary.errors.push(format!("release stale claims: {}", e));
            }
        }

        let items = self.queue.claim_pending(self.batch_size).await?;
        summary.claimed = items.len();
        if items.is_empty() {
            return Ok(summary);
        }

        info!(count = items.len(), "Draining outbound queue");

        for item in items {
            let outcome = self
                .transport
                .send(&settings, &OutboundEmail::from(&item))
                .await;

            if outcome.success {
                match self
                    .queue
                    .mark_sent(item.id, outcome.message_id.as_deref())
                    .await
                {
                    Ok(_) => {
                        info!(queue_id = %item.id, to = %item.to_address, "Email sent");
                        summary.sent += 1;
                    }
                    Err(e) => {
                        error!(queue_id = %item.id, error = %e, "Failed to mark email as sent");
                        summary.errors.push(format!("{}: {}", item.id, e));
                    }
                }
                continue;
            }

            let reason = outcome
                .error
                .unwrap_or_else(|| "Unknown transport error".to_string());
            match self.queue.record_failure(item.id, &reason).await {
                Ok(Some(updated)) if updated.status == QueueStatus::Failed => {
                    error!(
                        queue_id = %item.id,
                        attempts = updated.attempts,
                        error = %reason,
                        "Email failed permanently"
                    );
                    summary.failed += 1;
                }
                Ok(Some(updated)) => {
                    warn!(
                        queue_id = %item.id,
                        attempts = updated.attempts,
                        max_attempts = updated.max_attempts,
                        error = %reason,
                        "Email send failed, will retry"
                    );
                    summary.retried += 1;
                }
                Ok(None) => {
                    // Deleted or released while we were sending
                    debug!(queue_id = %item.id, "Queue item no longer claimed");
                }
                Err(e) => {
                    error!(queue_id = %item.id, error = %e, "Failed to record send failure");
                    summary.errors.push(format!("{}: {}", item.id, e));
                }
            }
        }

        info!(
            sent = summary.sent,
            retried = summary.retried,
            failed = summary.failed,
            "Queue drain finished"
        );
        Ok(summary)
    }
}
