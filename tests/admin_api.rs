//! Management API: admin auth, key lifecycle, provider listing.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use keysentinel::config::Config;
use keysentinel::notification::email::ResendSender;
use keysentinel::proxy::registry::ProviderRegistry;
use keysentinel::proxy::upstream::UpstreamClient;
use keysentinel::store::memory::MemoryStore;
use keysentinel::store::CredentialStore;
use keysentinel::{app, AppState};

const ADMIN_KEY: &str = "test-admin-key";

fn state(store: Option<MemoryStore>, admin_key: Option<&str>) -> Arc<AppState> {
    let config = Config {
        admin_key: admin_key.map(String::from),
        ..Config::default()
    };
    Arc::new(AppState {
        store: store.map(|s| Arc::new(s) as Arc<dyn CredentialStore>),
        registry: ProviderRegistry::builtin(&config.gemini_model),
        upstream: UpstreamClient::new(Duration::from_secs(5), 0).unwrap(),
        notifier: Arc::new(ResendSender::new(None, config.notify_from.clone())),
        config,
    })
}

async fn call(
    state: Arc<AppState>,
    method: &str,
    uri: &str,
    admin_key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(key) = admin_key {
        req = req.header("x-admin-key", key);
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app::router(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn new_key_body(provider: &str) -> Value {
    json!({
        "userId": "user-1",
        "name": "Production key",
        "provider": provider,
        "apiKey": "sk-proj-abcdefghijklmnop",
        "notifyEmail": "owner@example.com",
        "rateLimit": 100
    })
}

#[tokio::test]
async fn test_missing_admin_key_is_unauthorized() {
    let s = state(Some(MemoryStore::new()), Some(ADMIN_KEY));
    let (status, _) = call(s.clone(), "GET", "/api/v1/providers", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(s, "GET", "/api/v1/providers", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_admin_key_is_accepted() {
    let s = state(Some(MemoryStore::new()), Some(ADMIN_KEY));
    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/providers")
        .header("authorization", format!("Bearer {}", ADMIN_KEY))
        .body(Body::empty())
        .unwrap();
    let resp = app::router(s).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unset_admin_key_disables_api() {
    let s = state(Some(MemoryStore::new()), None);
    let (status, _) = call(s, "GET", "/api/v1/providers", Some("anything"), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_providers_are_listed_sorted() {
    let s = state(Some(MemoryStore::new()), Some(ADMIN_KEY));
    let (status, body) = call(s, "GET", "/api/v1/providers", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["gemini", "openai"]));
}

#[tokio::test]
async fn test_key_lifecycle() {
    let store = MemoryStore::new();
    let s = state(Some(store.clone()), Some(ADMIN_KEY));

    // Create
    let (status, created) = call(
        s.clone(),
        "POST",
        "/api/v1/keys",
        Some(ADMIN_KEY),
        Some(new_key_body("openai")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    let sentinel = created["sentinelKey"].as_str().unwrap().to_string();
    assert!(sentinel.starts_with("sentinel_"));
    assert_eq!(created["provider"], "openai");

    // The new sentinel resolves to the stored credential
    let resolved = store.find_by_sentinel(&sentinel).await.unwrap().unwrap();
    assert_eq!(resolved.id, id);
    assert_eq!(resolved.rate_limit, 100);

    // List masks the secret
    let (status, listed) = call(
        s.clone(),
        "GET",
        "/api/v1/keys?userId=user-1",
        Some(ADMIN_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let keys = listed.as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["sentinelKey"], sentinel.as_str());
    assert!(!listed.to_string().contains("sk-proj-abcdefghijklmnop"));

    // Delete
    let uri = format!("/api/v1/keys/{}", id);
    let (status, body) = call(s.clone(), "DELETE", &uri, Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(store.find_by_sentinel(&sentinel).await.unwrap().is_none());

    let (status, body) = call(s, "DELETE", &uri, Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "API key not found");
}

#[tokio::test]
async fn test_create_rejects_unknown_provider() {
    let s = state(Some(MemoryStore::new()), Some(ADMIN_KEY));
    let (status, body) = call(
        s,
        "POST",
        "/api/v1/keys",
        Some(ADMIN_KEY),
        Some(new_key_body("cohere")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unsupported provider: cohere");
}

#[tokio::test]
async fn test_create_rejects_blank_fields() {
    let s = state(Some(MemoryStore::new()), Some(ADMIN_KEY));
    let mut body = new_key_body("openai");
    body["apiKey"] = json!("  ");
    let (status, resp) = call(s, "POST", "/api/v1/keys", Some(ADMIN_KEY), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["error"], "Invalid API key data");
}

#[tokio::test]
async fn test_list_requires_user_id() {
    let s = state(Some(MemoryStore::new()), Some(ADMIN_KEY));
    let (status, body) = call(s, "GET", "/api/v1/keys", Some(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing userId");
}

#[tokio::test]
async fn test_key_routes_need_a_store() {
    let s = state(None, Some(ADMIN_KEY));
    let (status, body) = call(
        s,
        "GET",
        "/api/v1/keys?userId=user-1",
        Some(ADMIN_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Credential store URL not configured");
}

#[tokio::test]
async fn test_health_and_security_headers() {
    let s = state(None, None);
    let req = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let resp = app::router(s).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
    assert_eq!(resp.headers()["cache-control"], "no-store");
}
