use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::{api, proxy, AppState};

/// Full HTTP surface: health, proxy endpoint and the management API.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.config.dashboard_origin.clone());

    Router::new()
        // Health endpoint (no auth)
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/api/proxy",
            post(proxy::handler::proxy_handler).fallback(proxy::handler::method_not_allowed),
        )
        .nest("/api/v1", api::api_router(state.clone()))
        .with_state(state)
        // Enforce 25 MB body size limit on all routes
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware))
}

/// With `DASHBOARD_ORIGIN` set, only that origin and local dev hosts are
/// allowed; otherwise any origin may call the proxy (no cookies involved).
fn cors_layer(dashboard_origin: Option<String>) -> CorsLayer {
    let origin = match dashboard_origin {
        Some(dashboard_origin) => AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            origin_str == dashboard_origin
                || origin_str.starts_with("http://localhost:")
                || origin_str.starts_with("http://127.0.0.1:")
        }),
        None => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-admin-key"),
        ])
}

/// Per-request id, shared by the handler span and the `x-request-id` header.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Middleware: assigns a request id, exposes it to handlers through request
/// extensions and echoes it in `x-request-id` so clients can correlate
/// errors with gateway logs.
async fn request_id_middleware(
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestId(req_id.clone()));
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: injects security headers into every response.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    // Proxied completions must never be cached by intermediaries
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}
