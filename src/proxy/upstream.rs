/// HTTP client for forwarding requests to upstream providers.
/// Uses reqwest-middleware for retries on transient transport failures.
use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::errors::AppError;

#[derive(Clone)]
pub struct UpstreamClient {
    client: ClientWithMiddleware,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(timeout: Duration, max_retries: u32) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(32)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        let mut builder = ClientBuilder::new(reqwest_client);
        if max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }

        Ok(Self {
            client: builder.build(),
            timeout,
        })
    }

    /// POST `body` to `url`. Transport failures and timeouts become
    /// [`AppError::UpstreamUnavailable`]; any HTTP status is a success here.
    pub async fn post_json(
        &self,
        provider: &str,
        url: url::Url,
        headers: reqwest::header::HeaderMap,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, AppError> {
        let send = self.client.post(url).headers(headers).body(body).send();

        // Outer bound also covers the retry backoff sleeps.
        match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => {
                tracing::warn!(provider, "Upstream request failed: {}", e);
                Err(AppError::UpstreamUnavailable {
                    provider: provider.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(provider, timeout_secs = self.timeout.as_secs(), "Upstream request timed out");
                Err(AppError::UpstreamUnavailable {
                    provider: provider.to_string(),
                    reason: format!("timed out after {}s", self.timeout.as_secs()),
                })
            }
        }
    }
}
