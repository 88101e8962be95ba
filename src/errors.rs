use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub const MISSING_FIELDS: &str = "Missing appKey, provider, or payload in request body";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid sentinel token")]
    Unauthorized,

    #[error("upstream {provider} unavailable: {reason}")]
    UpstreamUnavailable { provider: String, reason: String },

    #[error("credential store URL not configured")]
    StoreNotConfigured,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn missing_fields() -> Self {
        AppError::BadRequest(MISSING_FIELDS.to_string())
    }

    pub fn provider_mismatch(actual: &str, asserted: &str) -> Self {
        AppError::BadRequest(format!(
            "Bad Request: App key is linked to {}, not {}",
            actual, asserted
        ))
    }

    pub fn unsupported_provider(provider: &str) -> Self {
        AppError::BadRequest(format!("Unsupported provider: {}", provider))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::UpstreamUnavailable { .. }
            | AppError::StoreNotConfigured
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The short, human-readable message returned to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Unauthorized => "Unauthorized: Invalid app key".to_string(),
            AppError::UpstreamUnavailable { provider, .. } => {
                format!("Failed to call {} API", provider)
            }
            AppError::StoreNotConfigured => "Credential store URL not configured".to_string(),
            AppError::Internal(_) => "Internal Server Error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::UpstreamUnavailable { provider, reason } => {
                tracing::error!(provider = %provider, "Upstream call failed: {}", reason);
            }
            AppError::StoreNotConfigured => {
                tracing::error!("KEYSENTINEL_STORE_URL is not set");
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
            }
            AppError::BadRequest(_) | AppError::Unauthorized => {}
        }

        let body = Json(json!({ "error": self.public_message() }));
        (self.status(), body).into_response()
    }
}
