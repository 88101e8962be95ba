use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::credential::Credential;
use crate::notification::{NotificationSender, SendOutcome};
use crate::store::CredentialStore;

// ── Alert Policy ──────────────────────────────────────────────

/// Usage percentage at which the owner gets an alert.
pub const ALERT_THRESHOLD_PCT: f64 = 80.0;

/// Minimum gap between two alerts for the same credential.
pub fn alert_cooldown() -> Duration {
    Duration::hours(24)
}

/// `requests / rate_limit * 100`, or 0 when no limit is configured.
pub fn usage_percentage(requests: u64, rate_limit: u64) -> f64 {
    if rate_limit == 0 {
        return 0.0;
    }
    requests as f64 / rate_limit as f64 * 100.0
}

/// Per-credential alert gate: `Idle -> Sent` once the threshold is crossed
/// with the cooldown expired, `Sent -> Idle` after 24h.
///
/// Returns the current usage percentage when an alert is due.
pub fn alert_due(cred: &Credential, now: DateTime<Utc>) -> Option<f64> {
    cred.notify_email.as_deref().filter(|e| !e.is_empty())?;
    if cred.rate_limit == 0 {
        return None;
    }

    let pct = usage_percentage(cred.requests, cred.rate_limit);
    if pct < ALERT_THRESHOLD_PCT {
        return None;
    }

    match cred.last_notified_at {
        Some(last) if now - last <= alert_cooldown() => None,
        _ => Some(pct),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UsageAlert {
    pub to: String,
    pub subject: String,
    pub html: String,
}

pub fn compose_alert(cred: &Credential, pct: f64) -> Option<UsageAlert> {
    let to = cred.notify_email.clone()?;
    Some(UsageAlert {
        to,
        subject: format!("Usage alert: {} at {:.0}% of its limit", cred.name, pct),
        html: format!(
            "<p>Your <strong>{}</strong> key ({}) has used <strong>{:.1}%</strong> of its configured limit.</p>\
             <p>Requests: {} of {}.</p>",
            cred.name, cred.provider, pct, cred.requests, cred.rate_limit
        ),
    })
}

// ── Recording ─────────────────────────────────────────────────

/// Records one forwarded call against a credential and fires the usage
/// alert when due. Failures are logged and never returned.
#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn NotificationSender>,
}

impl UsageRecorder {
    pub fn new(store: Arc<dyn CredentialStore>, notifier: Arc<dyn NotificationSender>) -> Self {
        Self { store, notifier }
    }

    pub async fn record(&self, credential_id: &str, tokens_used: u64) -> Option<JoinHandle<SendOutcome>> {
        self.record_at(credential_id, tokens_used, Utc::now()).await
    }

    /// Returns the handle of the spawned alert delivery, if one was started.
    /// Callers on the request path drop it; tests await it.
    #[tracing::instrument(skip(self, now))]
    pub async fn record_at(
        &self,
        credential_id: &str,
        tokens_used: u64,
        now: DateTime<Utc>,
    ) -> Option<JoinHandle<SendOutcome>> {
        // Counts calls, not tokens: the request counter is what the limit is measured in.
        let updated = match self.store.increment_usage(credential_id, tokens_used, now).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                debug!("credential no longer exists, skipping usage accounting");
                return None;
            }
            Err(e) => {
                error!(error = %e, "usage accounting: increment failed");
                return None;
            }
        };
        debug!(requests = updated.requests, rate_limit = updated.rate_limit, "usage recorded");

        let pct = alert_due(&updated, now)?;
        let alert = compose_alert(&updated, pct)?;

        // Stamp before sending so a failed or slow delivery cannot cause a second attempt.
        if let Err(e) = self.store.mark_notified(credential_id, now).await {
            error!(error = %e, "usage alert skipped: could not record notification time");
            return None;
        }

        info!(
            usage_pct = pct,
            requests = updated.requests,
            rate_limit = updated.rate_limit,
            "usage threshold crossed, sending alert"
        );

        let notifier = self.notifier.clone();
        let credential_id = credential_id.to_string();
        Some(tokio::spawn(async move {
            let outcome = notifier.send(&alert.to, &alert.subject, &alert.html).await;
            if outcome.success {
                info!(credential_id = %credential_id, "usage alert delivered");
            } else {
                warn!(credential_id = %credential_id, message = %outcome.message, "usage alert delivery failed");
            }
            outcome
        }))
    }
}
