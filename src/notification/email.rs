use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{NotificationSender, SendOutcome};

pub const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Email delivery through the Resend HTTP API.
#[derive(Clone)]
pub struct ResendSender {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
    endpoint: String,
}

#[derive(Serialize)]
struct EmailMessage<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Deserialize)]
struct ResendError {
    message: Option<String>,
}

impl ResendSender {
    pub fn new(api_key: Option<String>, from: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_key,
            from: from.into(),
            endpoint: RESEND_API_URL.to_string(),
        }
    }

    /// Point the sender at a different API base (used by tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl NotificationSender for ResendSender {
    async fn send(&self, to: &str, subject: &str, html: &str) -> SendOutcome {
        let api_key = match &self.api_key {
            Some(k) => k,
            None => {
                tracing::warn!("RESEND_API_KEY is not set. Skipping email sending.");
                return SendOutcome::failed("Resend API key not configured.");
            }
        };

        let message = EmailMessage {
            from: &self.from,
            to: [to],
            subject,
            html,
        };

        let resp = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&message)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "Error sending email");
                return SendOutcome::failed("An unexpected error occurred.");
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ResendError>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("email provider returned {}", status));
            tracing::error!(status = %status, "Failed to send email: {}", message);
            return SendOutcome::failed(message);
        }

        tracing::info!(subject, "Email sent successfully");
        SendOutcome::ok("Email sent successfully.")
    }
}
