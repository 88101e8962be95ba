use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::CredentialStore;
use crate::models::credential::{Credential, CredentialStatus, NewCredential, SentinelToken};

pub const DEMO_OWNER: &str = "demo-user-1";
pub const DEMO_OPENAI_SENTINEL: &str = "sentinel_oai_abc123";
pub const DEMO_GEMINI_SENTINEL: &str = "sentinel_gem_xyz789";

/// Process-local credential store.
///
/// Usage increments happen while holding the DashMap shard lock for the
/// credential, so concurrent forwards never lose a count.
#[derive(Clone, Default)]
pub struct MemoryStore {
    credentials: Arc<DashMap<String, Credential>>,
    sentinels: Arc<DashMap<String, SentinelToken>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// One OpenAI and one Gemini credential for local demos.
    pub fn seed_demo(&self) {
        let now = Utc::now();
        let seeds = [
            ("api-key-1", "OpenAI GPT-4", "openai", DEMO_OPENAI_SENTINEL, 1000),
            ("api-key-2", "Gemini Pro", "gemini", DEMO_GEMINI_SENTINEL, 500),
        ];
        for (id, name, provider, sentinel, rate_limit) in seeds {
            self.credentials.insert(
                id.to_string(),
                Credential {
                    id: id.to_string(),
                    owner_id: DEMO_OWNER.to_string(),
                    name: name.to_string(),
                    provider: provider.to_string(),
                    api_key: format!("demo_{}_key", provider),
                    description: None,
                    notify_email: None,
                    rate_limit,
                    scopes: Vec::new(),
                    requests: 0,
                    tokens_used: 0,
                    last_used: None,
                    last_notified_at: None,
                    status: CredentialStatus::Active,
                    created_at: now,
                },
            );
            self.sentinels.insert(
                sentinel.to_string(),
                SentinelToken {
                    token: sentinel.to_string(),
                    credential_id: id.to_string(),
                    created_at: now,
                },
            );
        }
        tracing::info!("Seeded in-memory store with {} demo credentials", seeds.len());
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_sentinel(&self, token: &str) -> anyhow::Result<Option<Credential>> {
        let credential_id = match self.sentinels.get(token) {
            Some(s) => s.credential_id.clone(),
            None => return Ok(None),
        };
        Ok(self.credentials.get(&credential_id).map(|c| c.clone()))
    }

    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<Credential>> {
        Ok(self.credentials.get(id).map(|c| c.clone()))
    }

    async fn increment_usage(
        &self,
        id: &str,
        tokens_used: u64,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Credential>> {
        Ok(self.credentials.get_mut(id).map(|mut c| {
            c.requests += 1;
            c.tokens_used = c.tokens_used.saturating_add(tokens_used);
            c.last_used = Some(at);
            c.clone()
        }))
    }

    async fn mark_notified(&self, id: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        if let Some(mut c) = self.credentials.get_mut(id) {
            c.last_notified_at = Some(at);
        }
        Ok(())
    }

    async fn create_credential(&self, new: NewCredential) -> anyhow::Result<Credential> {
        let cred = Credential {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: new.owner_id,
            name: new.name,
            provider: new.provider,
            api_key: new.api_key,
            description: new.description,
            notify_email: new.notify_email,
            rate_limit: new.rate_limit,
            scopes: new.scopes,
            requests: 0,
            tokens_used: 0,
            last_used: None,
            last_notified_at: None,
            status: CredentialStatus::Active,
            created_at: Utc::now(),
        };
        self.credentials.insert(cred.id.clone(), cred.clone());
        Ok(cred)
    }

    async fn create_sentinel(
        &self,
        token: &str,
        credential_id: &str,
    ) -> anyhow::Result<SentinelToken> {
        if !self.credentials.contains_key(credential_id) {
            anyhow::bail!("credential {} does not exist", credential_id);
        }
        let sentinel = SentinelToken {
            token: token.to_string(),
            credential_id: credential_id.to_string(),
            created_at: Utc::now(),
        };
        match self.sentinels.entry(token.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                anyhow::bail!("sentinel token already exists")
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(sentinel.clone());
            }
        }
        Ok(sentinel)
    }

    async fn list_credentials(
        &self,
        owner_id: &str,
    ) -> anyhow::Result<Vec<(Credential, Option<String>)>> {
        let mut creds: Vec<Credential> = self
            .credentials
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .map(|c| c.clone())
            .collect();
        creds.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(creds
            .into_iter()
            .map(|c| {
                let sentinel = self
                    .sentinels
                    .iter()
                    .filter(|s| s.credential_id == c.id)
                    .min_by_key(|s| s.created_at)
                    .map(|s| s.token.clone());
                (c, sentinel)
            })
            .collect())
    }

    async fn delete_credential(&self, id: &str) -> anyhow::Result<bool> {
        let removed = self.credentials.remove(id).is_some();
        if removed {
            self.sentinels.retain(|_, s| s.credential_id != id);
        }
        Ok(removed)
    }
}
