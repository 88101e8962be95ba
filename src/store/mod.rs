pub mod memory;
pub mod postgres;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{Config, StoreBackend};
use crate::models::credential::{Credential, NewCredential, SentinelToken};

/// Abstraction over credential persistence.
/// Implementations: MemoryStore (DashMap), PgStore (PostgreSQL), RemoteStore (HTTP BaaS).
///
/// The usage increment is only atomic where the backend makes it so
/// (PgStore, MemoryStore). RemoteStore performs a read-modify-write on the
/// far side and concurrent calls may under-count.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve a sentinel token to the credential it maps to.
    async fn find_by_sentinel(&self, token: &str) -> anyhow::Result<Option<Credential>>;

    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<Credential>>;

    /// Bump the request counter by one, add `tokens_used` to the token tally
    /// and stamp `last_used`. Returns the updated record, or `None` if it is gone.
    async fn increment_usage(
        &self,
        id: &str,
        tokens_used: u64,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Credential>>;

    /// Record when the last usage alert was attempted.
    async fn mark_notified(&self, id: &str, at: DateTime<Utc>) -> anyhow::Result<()>;

    async fn create_credential(&self, new: NewCredential) -> anyhow::Result<Credential>;

    async fn create_sentinel(
        &self,
        token: &str,
        credential_id: &str,
    ) -> anyhow::Result<SentinelToken>;

    /// All credentials of one owner, each with its first sentinel token.
    async fn list_credentials(
        &self,
        owner_id: &str,
    ) -> anyhow::Result<Vec<(Credential, Option<String>)>>;

    /// Delete a credential and every sentinel token pointing at it.
    async fn delete_credential(&self, id: &str) -> anyhow::Result<bool>;
}

/// Build the backend selected by `KEYSENTINEL_STORE`.
///
/// Returns `Ok(None)` for the remote backend without a base URL: the
/// gateway still starts, and every proxied request fails with 500.
pub async fn connect(cfg: &Config) -> anyhow::Result<Option<Arc<dyn CredentialStore>>> {
    match cfg.store_backend {
        StoreBackend::Memory => {
            let store = memory::MemoryStore::new();
            if cfg.seed_demo {
                store.seed_demo();
            }
            Ok(Some(Arc::new(store)))
        }
        StoreBackend::Postgres => {
            let url = cfg
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("KEYSENTINEL_STORE=postgres requires DATABASE_URL"))?;
            tracing::info!("Connecting to database...");
            let db = postgres::PgStore::connect(url).await?;
            tracing::info!("Running migrations...");
            db.migrate().await?;
            Ok(Some(Arc::new(db)))
        }
        StoreBackend::Remote => Ok(cfg
            .store_url
            .as_deref()
            .map(|url| Arc::new(remote::RemoteStore::new(url)) as Arc<dyn CredentialStore>)),
    }
}
