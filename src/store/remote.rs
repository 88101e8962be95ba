//! Credential store backed by a remote backend-as-a-service.
//!
//! Every call is a `POST {base}/api/query` or `POST {base}/api/mutation` with
//! `{ "path": "module:function", "args": {...} }`. Replies carry
//! `{ "status": "success", "value": ... }` or
//! `{ "status": "error", "errorMessage": "..." }`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::CredentialStore;
use crate::models::credential::{Credential, CredentialStatus, NewCredential, SentinelToken};

#[derive(Clone)]
pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct FunctionCall<'a> {
    path: &'a str,
    args: Value,
    format: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionReply {
    status: String,
    #[serde(default)]
    value: Value,
    error_message: Option<String>,
}

impl RemoteStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("KeySentinel-Gateway/1.0")
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn call(&self, kind: &str, path: &str, args: Value) -> anyhow::Result<Value> {
        let url = format!("{}/api/{}", self.base_url, kind);
        let resp = self
            .client
            .post(&url)
            .json(&FunctionCall {
                path,
                args,
                format: "json",
            })
            .send()
            .await
            .with_context(|| format!("credential store {} {} failed", kind, path))?;

        let status = resp.status();
        let reply: FunctionReply = resp
            .json()
            .await
            .with_context(|| format!("credential store {} returned non-JSON (status {})", path, status))?;

        if reply.status != "success" {
            anyhow::bail!(
                "credential store {} error: {}",
                path,
                reply.error_message.unwrap_or_else(|| "unknown error".into())
            );
        }
        Ok(reply.value)
    }

    async fn query(&self, path: &str, args: Value) -> anyhow::Result<Value> {
        self.call("query", path, args).await
    }

    async fn mutation(&self, path: &str, args: Value) -> anyhow::Result<Value> {
        self.call("mutation", path, args).await
    }
}

#[async_trait]
impl CredentialStore for RemoteStore {
    async fn find_by_sentinel(&self, token: &str) -> anyhow::Result<Option<Credential>> {
        let value = self
            .query("keys:fetchApiKeyBySentinelKey", json!({ "sentinelKey": token }))
            .await?;
        parse_optional_doc(value)
    }

    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<Credential>> {
        let value = self.query("keys:getApiKey", json!({ "apiKeyId": id })).await?;
        parse_optional_doc(value)
    }

    /// The remote side stamps `lastUsed` with its own clock, so `at` is unused.
    async fn increment_usage(
        &self,
        id: &str,
        tokens_used: u64,
        _at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Credential>> {
        self.mutation(
            "keys:logApiKeyUsage",
            json!({ "apiKeyId": id, "tokensUsed": tokens_used }),
        )
        .await?;
        self.get_by_id(id).await
    }

    async fn mark_notified(&self, id: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        self.mutation(
            "keys:markUsageNotified",
            json!({ "apiKeyId": id, "at": at.timestamp_millis() }),
        )
        .await?;
        Ok(())
    }

    async fn create_credential(&self, new: NewCredential) -> anyhow::Result<Credential> {
        let args = serde_json::to_value(AddApiKeyArgs::from(&new))
            .context("failed to encode keys:addApiKey args")?;
        let value = self.mutation("keys:addApiKey", args).await?;
        let id = value
            .as_str()
            .context("keys:addApiKey did not return an id")?
            .to_string();
        self.get_by_id(&id)
            .await?
            .with_context(|| format!("credential {} vanished after insert", id))
    }

    async fn create_sentinel(
        &self,
        token: &str,
        credential_id: &str,
    ) -> anyhow::Result<SentinelToken> {
        self.mutation(
            "keys:addSentinelKey",
            json!({ "sentinelKey": token, "mapsToKeyId": credential_id }),
        )
        .await?;
        Ok(SentinelToken {
            token: token.to_string(),
            credential_id: credential_id.to_string(),
            created_at: Utc::now(),
        })
    }

    async fn list_credentials(
        &self,
        owner_id: &str,
    ) -> anyhow::Result<Vec<(Credential, Option<String>)>> {
        let value = self.query("keys:getApiKeys", json!({ "userId": owner_id })).await?;
        let docs: Vec<RemoteApiKey> =
            serde_json::from_value(value).context("keys:getApiKeys returned malformed documents")?;
        Ok(docs
            .into_iter()
            .map(|d| {
                let sentinel = d.sentinel_key.clone();
                (d.into_credential(), sentinel)
            })
            .collect())
    }

    async fn delete_credential(&self, id: &str) -> anyhow::Result<bool> {
        let value = self
            .mutation("keys:deleteApiKey", json!({ "apiKeyId": id }))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

/// Optional fields are left out rather than sent as `null`: the remote
/// validators accept a missing field but reject an explicit null.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddApiKeyArgs<'a> {
    user_id: &'a str,
    name: &'a str,
    provider: &'a str,
    api_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notify_email: Option<&'a str>,
    rate_limit: u64,
    scopes: &'a [String],
}

impl<'a> From<&'a NewCredential> for AddApiKeyArgs<'a> {
    fn from(new: &'a NewCredential) -> Self {
        Self {
            user_id: &new.owner_id,
            name: &new.name,
            provider: &new.provider,
            api_key: &new.api_key,
            description: new.description.as_deref(),
            notify_email: new.notify_email.as_deref(),
            rate_limit: new.rate_limit,
            scopes: &new.scopes,
        }
    }
}

fn parse_optional_doc(value: Value) -> anyhow::Result<Option<Credential>> {
    if value.is_null() {
        return Ok(None);
    }
    let doc: RemoteApiKey =
        serde_json::from_value(value).context("credential store returned a malformed api key")?;
    Ok(Some(doc.into_credential()))
}

/// Remote document shape. Numbers arrive as JSON floats, times as epoch millis.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteApiKey {
    #[serde(rename = "_id")]
    id: String,
    user_id: String,
    name: String,
    provider: String,
    api_key: String,
    description: Option<String>,
    notify_email: Option<String>,
    rate_limit: f64,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    requests: f64,
    #[serde(default)]
    tokens_used: f64,
    last_used: Option<f64>,
    last_notified_at: Option<f64>,
    #[serde(default = "default_status")]
    status: String,
    created_at: Option<f64>,
    #[serde(rename = "_creationTime")]
    creation_time: Option<f64>,
    sentinel_key: Option<String>,
}

fn default_status() -> String {
    "active".into()
}

fn from_millis(ms: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms as i64).single()
}

impl RemoteApiKey {
    fn into_credential(self) -> Credential {
        let created_at = self
            .created_at
            .or(self.creation_time)
            .and_then(from_millis)
            .unwrap_or_else(Utc::now);
        Credential {
            id: self.id,
            owner_id: self.user_id,
            name: self.name,
            provider: self.provider,
            api_key: self.api_key,
            description: self.description,
            notify_email: self.notify_email,
            rate_limit: self.rate_limit.max(0.0) as u64,
            scopes: self.scopes,
            requests: self.requests.max(0.0) as u64,
            tokens_used: self.tokens_used.max(0.0) as u64,
            last_used: self.last_used.and_then(from_millis),
            last_notified_at: self.last_notified_at.and_then(from_millis),
            status: CredentialStatus::parse(&self.status),
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_document_mapping() {
        let doc: RemoteApiKey = serde_json::from_value(json!({
            "_id": "k57abc",
            "_creationTime": 1_700_000_000_000.0,
            "userId": "user_1",
            "name": "Production OpenAI",
            "provider": "openai",
            "apiKey": "sk-live",
            "rateLimit": 100.0,
            "scopes": ["chat"],
            "requests": 42.0,
            "lastUsed": 1_700_000_500_000.0,
            "status": "active"
        }))
        .unwrap();
        let cred = doc.into_credential();
        assert_eq!(cred.id, "k57abc");
        assert_eq!(cred.rate_limit, 100);
        assert_eq!(cred.requests, 42);
        assert_eq!(cred.tokens_used, 0);
        assert!(cred.is_active());
        assert_eq!(cred.created_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(cred.last_used.unwrap().timestamp_millis(), 1_700_000_500_000);
        assert!(cred.last_notified_at.is_none());
    }

    #[test]
    fn test_null_value_is_not_found() {
        assert!(parse_optional_doc(Value::Null).unwrap().is_none());
    }

    #[test]
    fn test_malformed_document_is_error() {
        assert!(parse_optional_doc(json!({"name": "missing everything"})).is_err());
    }
}
