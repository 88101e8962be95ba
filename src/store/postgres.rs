use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

use super::CredentialStore;
use crate::models::credential::{Credential, CredentialStatus, NewCredential, SentinelToken};

const CREDENTIAL_COLUMNS: &str = "c.id, c.owner_id, c.name, c.provider, c.api_key, c.description, \
     c.notify_email, c.rate_limit, c.scopes, c.requests, c.tokens_used, c.last_used, \
     c.last_notified_at, c.status, c.created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_sentinel(&self, token: &str) -> anyhow::Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM sentinel_keys s \
             JOIN credentials c ON c.id = s.credential_id \
             WHERE s.key = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Credential::from))
    }

    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials c WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Credential::from))
    }

    async fn increment_usage(
        &self,
        id: &str,
        tokens_used: u64,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<Credential>> {
        // Single statement, so concurrent forwards cannot lose an increment.
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "UPDATE credentials c \
             SET requests = c.requests + 1, tokens_used = c.tokens_used + $2, last_used = $3 \
             WHERE c.id = $1 \
             RETURNING {CREDENTIAL_COLUMNS}"
        ))
        .bind(id)
        .bind(i64::try_from(tokens_used).unwrap_or(i64::MAX))
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Credential::from))
    }

    async fn mark_notified(&self, id: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE credentials SET last_notified_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_credential(&self, new: NewCredential) -> anyhow::Result<Credential> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            r#"INSERT INTO credentials AS c (owner_id, name, provider, api_key, description, notify_email, rate_limit, scopes)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING {CREDENTIAL_COLUMNS}"#
        ))
        .bind(&new.owner_id)
        .bind(&new.name)
        .bind(&new.provider)
        .bind(&new.api_key)
        .bind(&new.description)
        .bind(&new.notify_email)
        .bind(i64::try_from(new.rate_limit).unwrap_or(i64::MAX))
        .bind(Json(&new.scopes))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn create_sentinel(
        &self,
        token: &str,
        credential_id: &str,
    ) -> anyhow::Result<SentinelToken> {
        let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "INSERT INTO sentinel_keys (key, credential_id) VALUES ($1, $2) RETURNING created_at",
        )
        .bind(token)
        .bind(credential_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SentinelToken {
            token: token.to_string(),
            credential_id: credential_id.to_string(),
            created_at,
        })
    }

    async fn list_credentials(
        &self,
        owner_id: &str,
    ) -> anyhow::Result<Vec<(Credential, Option<String>)>> {
        let rows = sqlx::query_as::<_, CredentialWithSentinelRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS}, \
               (SELECT s.key FROM sentinel_keys s WHERE s.credential_id = c.id \
                ORDER BY s.created_at ASC LIMIT 1) AS sentinel_key \
             FROM credentials c WHERE c.owner_id = $1 ORDER BY c.created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (Credential::from(r.credential), r.sentinel_key))
            .collect())
    }

    async fn delete_credential(&self, id: &str) -> anyhow::Result<bool> {
        // sentinel_keys rows go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM credentials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// -- Row Types --

#[derive(Debug, sqlx::FromRow)]
pub struct CredentialRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub provider: String,
    pub api_key: String,
    pub description: Option<String>,
    pub notify_email: Option<String>,
    pub rate_limit: i64,
    pub scopes: Json<Vec<String>>,
    pub requests: i64,
    pub tokens_used: i64,
    pub last_used: Option<DateTime<Utc>>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct CredentialWithSentinelRow {
    #[sqlx(flatten)]
    pub credential: CredentialRow,
    pub sentinel_key: Option<String>,
}

impl From<CredentialRow> for Credential {
    fn from(r: CredentialRow) -> Self {
        Credential {
            id: r.id,
            owner_id: r.owner_id,
            name: r.name,
            provider: r.provider,
            api_key: r.api_key,
            description: r.description,
            notify_email: r.notify_email,
            rate_limit: r.rate_limit.max(0) as u64,
            scopes: r.scopes.0,
            requests: r.requests.max(0) as u64,
            tokens_used: r.tokens_used.max(0) as u64,
            last_used: r.last_used,
            last_notified_at: r.last_notified_at,
            status: CredentialStatus::parse(&r.status),
            created_at: r.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_clamps_negative_counters() {
        let row = CredentialRow {
            id: "c1".into(),
            owner_id: "u1".into(),
            name: "Prod".into(),
            provider: "openai".into(),
            api_key: "sk-test".into(),
            description: None,
            notify_email: Some("owner@example.com".into()),
            rate_limit: -5,
            scopes: Json(vec!["chat".into()]),
            requests: 12,
            tokens_used: -1,
            last_used: None,
            last_notified_at: None,
            status: "revoked".into(),
            created_at: Utc::now(),
        };
        let cred = Credential::from(row);
        assert_eq!(cred.rate_limit, 0);
        assert_eq!(cred.requests, 12);
        assert_eq!(cred.tokens_used, 0);
        assert_eq!(cred.scopes, vec!["chat".to_string()]);
        assert!(!cred.is_active());
    }
}
