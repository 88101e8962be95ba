//! Provider id → upstream endpoint, credential injection and usage field.
//!
//! Adding a provider means registering a [`ProviderSpec`]; the proxy handler
//! never branches on provider ids.

use std::collections::HashMap;
use std::str::FromStr;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use url::Url;
use zeroize::Zeroize;

use crate::config::Config;

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent";

/// Where the real credential goes in the upstream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialInjection {
    /// `header:<Name>[:<Scheme>]`, e.g. `header:Authorization:Bearer`.
    Header { name: String, scheme: Option<String> },
    /// `query:<param>`, URL-encoded into the query string.
    Query { param: String },
}

impl CredentialInjection {
    pub fn bearer() -> Self {
        CredentialInjection::Header {
            name: "Authorization".into(),
            scheme: Some("Bearer".into()),
        }
    }

    pub fn query(param: &str) -> Self {
        CredentialInjection::Query {
            param: param.to_string(),
        }
    }
}

impl FromStr for CredentialInjection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("header"), Some(name), scheme) if !name.is_empty() => {
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| anyhow::anyhow!("invalid injection header: {}", name))?;
                Ok(CredentialInjection::Header {
                    name: name.to_string(),
                    scheme: scheme.filter(|s| !s.is_empty()).map(String::from),
                })
            }
            (Some("query"), Some(param), None) if !param.is_empty() => {
                Ok(CredentialInjection::query(param))
            }
            _ => anyhow::bail!(
                "invalid credential injection '{}'. Expected header:<Name>[:<Scheme>] or query:<param>",
                s
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub id: String,
    pub endpoint: String,
    pub injection: CredentialInjection,
    /// Dotted path to the numeric usage counter in the upstream response.
    pub usage_field: Option<String>,
}

impl ProviderSpec {
    /// Upstream URL and headers with `credential` injected.
    pub fn build_request(&self, credential: &str) -> anyhow::Result<(Url, HeaderMap)> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| anyhow::anyhow!("invalid endpoint for {}: {}", self.id, e))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match &self.injection {
            CredentialInjection::Header { name, scheme } => {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| anyhow::anyhow!("invalid injection header: {}", name))?;
                let mut raw = match scheme {
                    Some(scheme) => format!("{} {}", scheme, credential),
                    None => credential.to_string(),
                };
                let value = HeaderValue::from_str(&raw);
                raw.zeroize();
                let mut value = value.map_err(|_| anyhow::anyhow!("invalid key format"))?;
                value.set_sensitive(true);
                headers.insert(name, value);
            }
            CredentialInjection::Query { param } => {
                url.query_pairs_mut().append_pair(param, credential);
            }
        }

        Ok((url, headers))
    }

    /// Usage count reported by the upstream, 0 when absent or not a number.
    pub fn extract_usage(&self, body: &Value) -> u64 {
        self.usage_field
            .as_deref()
            .map(|path| extract_path_u64(body, path))
            .unwrap_or(0)
    }
}

/// Follow a dotted path (`usage.prompt_tokens`) and read it as a non-negative integer.
pub fn extract_path_u64(body: &Value, path: &str) -> u64 {
    let mut cur = body;
    for segment in path.split('.') {
        match cur.get(segment) {
            Some(next) => cur = next,
            None => return 0,
        }
    }
    cur.as_u64()
        .or_else(|| cur.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderSpec>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `openai` (Bearer header) and `gemini` (`key` query parameter).
    pub fn builtin(gemini_model: &str) -> Self {
        let mut registry = Self::empty();
        registry.register(ProviderSpec {
            id: "openai".into(),
            endpoint: OPENAI_ENDPOINT.into(),
            injection: CredentialInjection::bearer(),
            usage_field: Some("usage.prompt_tokens".into()),
        });
        registry.register(ProviderSpec {
            id: "gemini".into(),
            endpoint: GEMINI_ENDPOINT.replace("{model}", gemini_model),
            injection: CredentialInjection::query("key"),
            usage_field: Some("usageMetadata.promptTokenCount".into()),
        });
        registry
    }

    /// Built-in providers with endpoint overrides from the environment.
    pub fn from_config(cfg: &Config) -> Self {
        let mut registry = Self::builtin(&cfg.gemini_model);
        if let Some(url) = &cfg.openai_url {
            registry = registry.with_endpoint("openai", url);
        }
        if let Some(url) = &cfg.gemini_url {
            registry = registry.with_endpoint("gemini", &url.replace("{model}", &cfg.gemini_model));
        }
        registry
    }

    pub fn register(&mut self, spec: ProviderSpec) {
        self.providers.insert(spec.id.clone(), spec);
    }

    /// Replace the endpoint of an already registered provider.
    pub fn with_endpoint(mut self, id: &str, endpoint: &str) -> Self {
        match self.providers.get_mut(id) {
            Some(spec) => spec.endpoint = endpoint.to_string(),
            None => tracing::warn!(provider = id, "endpoint override for unknown provider ignored"),
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&ProviderSpec> {
        self.providers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
