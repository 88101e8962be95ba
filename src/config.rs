use std::time::Duration;

use serde::Deserialize;

/// Which Credential Store backend the gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
    Remote,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "remote" => Ok(StoreBackend::Remote),
            other => anyhow::bail!(
                "invalid KEYSENTINEL_STORE: {}. Must be one of memory, postgres, remote",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    /// Base URL of the remote credential store. Only read by the `remote` backend.
    pub store_url: Option<String>,
    pub admin_key: Option<String>,
    pub upstream_timeout_secs: u64,
    /// Transient-failure retries for the forwarding POST. 0 = send once.
    pub upstream_retries: u32,
    pub gemini_model: String,
    pub openai_url: Option<String>,
    pub gemini_url: Option<String>,
    pub resend_api_key: Option<String>,
    pub notify_from: String,
    /// Seed the in-memory store with demo credentials.
    pub seed_demo: bool,
    pub json_logs: bool,
    /// Extra browser origin allowed by CORS. Unset = any origin.
    pub dashboard_origin: Option<String>,
}

impl Config {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            store_backend: StoreBackend::Memory,
            database_url: None,
            store_url: None,
            admin_key: None,
            upstream_timeout_secs: 30,
            upstream_retries: 0,
            gemini_model: "gemini-2.0-flash".into(),
            openai_url: None,
            gemini_url: None,
            resend_api_key: None,
            notify_from: "onboarding@resend.dev".into(),
            seed_demo: false,
            json_logs: false,
            dashboard_origin: None,
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn flag(key: &str) -> bool {
    matches!(
        non_empty(key).as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes")
    )
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = Config::default();

    let store_backend = match non_empty("KEYSENTINEL_STORE") {
        Some(v) => v.parse()?,
        None => defaults.store_backend,
    };

    let store_url = non_empty("KEYSENTINEL_STORE_URL");
    if store_backend == StoreBackend::Remote && store_url.is_none() {
        eprintln!("⚠️  KEYSENTINEL_STORE=remote but KEYSENTINEL_STORE_URL is not set — every proxied request will fail with 500.");
    }

    Ok(Config {
        port: non_empty("KEYSENTINEL_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port),
        store_backend,
        database_url: non_empty("DATABASE_URL"),
        store_url,
        admin_key: non_empty("KEYSENTINEL_ADMIN_KEY"),
        upstream_timeout_secs: non_empty("KEYSENTINEL_UPSTREAM_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(defaults.upstream_timeout_secs),
        upstream_retries: non_empty("KEYSENTINEL_UPSTREAM_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.upstream_retries),
        gemini_model: non_empty("KEYSENTINEL_GEMINI_MODEL").unwrap_or(defaults.gemini_model),
        openai_url: non_empty("KEYSENTINEL_OPENAI_URL"),
        gemini_url: non_empty("KEYSENTINEL_GEMINI_URL"),
        resend_api_key: non_empty("RESEND_API_KEY"),
        notify_from: non_empty("KEYSENTINEL_NOTIFY_FROM").unwrap_or(defaults.notify_from),
        seed_demo: flag("KEYSENTINEL_SEED_DEMO"),
        json_logs: non_empty("KEYSENTINEL_LOG_FORMAT").as_deref() == Some("json"),
        dashboard_origin: non_empty("DASHBOARD_ORIGIN"),
    })
}
