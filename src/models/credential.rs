use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Requests ceiling used when the owner does not configure one.
pub const DEFAULT_RATE_LIMIT: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    #[default]
    Active,
    Revoked,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Revoked => "revoked",
        }
    }

    /// Unknown values are treated as revoked so they never forward.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => CredentialStatus::Active,
            _ => CredentialStatus::Revoked,
        }
    }
}

/// One third-party API key owned by a user.
///
/// `api_key` is the raw provider credential and is never serialized into
/// management responses; use [`CredentialView`] for that.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub provider: String,
    pub api_key: String,
    pub description: Option<String>,
    pub notify_email: Option<String>,
    /// Informational request ceiling. Only used to compute the alert percentage.
    pub rate_limit: u64,
    pub scopes: Vec<String>,
    pub requests: u64,
    /// Sum of provider-reported token counts; does not count against `rate_limit`.
    pub tokens_used: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub status: CredentialStatus,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_active(&self) -> bool {
        self.status == CredentialStatus::Active
    }
}

/// Input for creating a credential.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCredential {
    pub owner_id: String,
    pub name: String,
    pub provider: String,
    pub api_key: String,
    pub description: Option<String>,
    pub notify_email: Option<String>,
    pub rate_limit: u64,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Public-facing opaque token mapped to exactly one credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentinelToken {
    pub token: String,
    pub credential_id: String,
    pub created_at: DateTime<Utc>,
}

/// `sentinel_<last 3 chars of credential id>_<32 hex chars>`.
pub fn generate_sentinel_token(credential_id: &str) -> String {
    use rand::RngCore;

    let tail: String = {
        let chars: Vec<char> = credential_id.chars().collect();
        let start = chars.len().saturating_sub(3);
        chars[start..].iter().collect()
    };
    let mut random_bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut random_bytes);
    format!("sentinel_{}_{}", tail, hex::encode(random_bytes))
}

/// `sk-proj-abc…wxyz` style preview of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

/// Credential metadata as exposed by the management API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialView {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub provider: String,
    pub api_key_preview: String,
    pub description: Option<String>,
    pub notify_email: Option<String>,
    pub rate_limit: u64,
    pub scopes: Vec<String>,
    pub requests: u64,
    pub tokens_used: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub status: CredentialStatus,
    pub created_at: DateTime<Utc>,
    pub sentinel_key: Option<String>,
}

impl CredentialView {
    pub fn new(cred: &Credential, sentinel_key: Option<String>) -> Self {
        Self {
            id: cred.id.clone(),
            user_id: cred.owner_id.clone(),
            name: cred.name.clone(),
            provider: cred.provider.clone(),
            api_key_preview: mask_secret(&cred.api_key),
            description: cred.description.clone(),
            notify_email: cred.notify_email.clone(),
            rate_limit: cred.rate_limit,
            scopes: cred.scopes.clone(),
            requests: cred.requests,
            tokens_used: cred.tokens_used,
            last_used: cred.last_used,
            last_notified_at: cred.last_notified_at,
            status: cred.status,
            created_at: cred.created_at,
            sentinel_key,
        }
    }
}
