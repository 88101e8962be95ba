//! KeySentinel Gateway — library crate.
//!
//! Clients authenticate with a sentinel token; the gateway swaps it for the
//! owner's real provider credential, forwards the call and records usage.

use std::sync::Arc;

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod notification;
pub mod proxy;
pub mod store;

use notification::NotificationSender;
use proxy::registry::ProviderRegistry;
use proxy::upstream::UpstreamClient;
use store::CredentialStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    /// `None` when the remote backend has no base URL configured.
    pub store: Option<Arc<dyn CredentialStore>>,
    pub registry: ProviderRegistry,
    pub upstream: UpstreamClient,
    pub notifier: Arc<dyn NotificationSender>,
    pub config: config::Config,
}

impl AppState {
    /// Wire every collaborator from configuration.
    pub async fn from_config(cfg: config::Config) -> anyhow::Result<Self> {
        let store = store::connect(&cfg).await?;
        let registry = ProviderRegistry::from_config(&cfg);
        let upstream = UpstreamClient::new(cfg.upstream_timeout(), cfg.upstream_retries)?;
        let notifier = Arc::new(notification::email::ResendSender::new(
            cfg.resend_api_key.clone(),
            cfg.notify_from.clone(),
        ));

        Ok(Self {
            store,
            registry,
            upstream,
            notifier,
            config: cfg,
        })
    }
}
