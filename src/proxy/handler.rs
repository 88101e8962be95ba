use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use zeroize::Zeroize;

use crate::app::RequestId;
use crate::errors::AppError;
use crate::middleware::usage::UsageRecorder;
use crate::models::proxy::{ForwardRequest, ForwardResult};
use crate::AppState;

/// `POST /api/proxy` — relay `payload` to the provider behind `appKey`.
#[tracing::instrument(skip_all, fields(req_id = tracing::field::Empty))]
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    request_id: Option<Extension<RequestId>>,
    body: Bytes,
) -> Result<Response, AppError> {
    if let Some(Extension(id)) = &request_id {
        tracing::Span::current().record("req_id", tracing::field::display(id));
    }
    let request = ForwardRequest::from_slice(&body)?;
    let result = forward(&state, request).await?;
    Ok((result.status, Json(result.body)).into_response())
}

/// Any non-POST method on the proxy route.
pub async fn method_not_allowed() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

/// Resolve the sentinel token, call the upstream provider with the real
/// credential, record usage and hand back the upstream answer unchanged.
pub async fn forward(state: &AppState, req: ForwardRequest) -> Result<ForwardResult, AppError> {
    let store = state.store.as_ref().ok_or(AppError::StoreNotConfigured)?;

    // -- 1. Resolve sentinel token --
    // Store failures are reported as an invalid key, same as a miss.
    let credential = match store.find_by_sentinel(&req.sentinel_token).await {
        Ok(Some(c)) => c,
        Ok(None) => {
            warn!(provider = %req.provider, "proxy: unknown sentinel token");
            return Err(AppError::Unauthorized);
        }
        Err(e) => {
            error!(error = %e, "proxy: credential store lookup failed");
            return Err(AppError::Unauthorized);
        }
    };

    if !credential.is_active() {
        warn!(credential_id = %credential.id, "proxy: credential is not active");
        return Err(AppError::Unauthorized);
    }

    // -- 2. Provider checks --
    if credential.provider != req.provider {
        return Err(AppError::provider_mismatch(&credential.provider, &req.provider));
    }

    let spec = state
        .registry
        .get(&req.provider)
        .ok_or_else(|| AppError::unsupported_provider(&req.provider))?;

    // -- 3. Build upstream request --
    let mut real_key = credential.api_key.clone();
    let built = spec.build_request(&real_key);
    real_key.zeroize();
    let (url, headers) = built?;

    let body = serde_json::to_vec(&req.payload).map_err(|e| AppError::Internal(e.into()))?;

    // -- 4. Forward --
    let upstream_resp = state
        .upstream
        .post_json(&spec.id, url, headers, body)
        .await?;

    let status = StatusCode::from_u16(upstream_resp.status().as_u16()).unwrap_or(StatusCode::OK);
    let bytes = upstream_resp
        .bytes()
        .await
        .map_err(|e| AppError::UpstreamUnavailable {
            provider: spec.id.clone(),
            reason: format!("failed to read response body: {}", e),
        })?;
    let upstream_body: Value =
        serde_json::from_slice(&bytes).map_err(|e| AppError::UpstreamUnavailable {
            provider: spec.id.clone(),
            reason: format!("non-JSON response (status {}): {}", status, e),
        })?;

    // -- 5. Usage accounting --
    let tokens_used = spec.extract_usage(&upstream_body);
    debug!(credential_id = %credential.id, tokens_used, "upstream usage extracted");

    // Never fails; the alert delivery, if any, runs detached.
    let _ = UsageRecorder::new(store.clone(), state.notifier.clone())
        .record(&credential.id, tokens_used)
        .await;

    info!(
        credential_id = %credential.id,
        provider = %spec.id,
        status = status.as_u16(),
        "proxied request"
    );

    Ok(ForwardResult {
        status,
        body: upstream_body,
    })
}
