use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::AppError;

/// Inbound body of `POST /api/proxy`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequestBody {
    pub app_key: Option<String>,
    pub provider: Option<String>,
    pub payload: Option<Value>,
}

/// A validated forwarding request.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub sentinel_token: String,
    pub provider: String,
    pub payload: Value,
}

impl ForwardRequest {
    /// Rejects a body where any of token, provider or payload is absent or empty.
    pub fn from_body(body: ForwardRequestBody) -> Result<Self, AppError> {
        let sentinel_token = body
            .app_key
            .filter(|s| !s.is_empty())
            .ok_or_else(AppError::missing_fields)?;
        let provider = body
            .provider
            .filter(|s| !s.is_empty())
            .ok_or_else(AppError::missing_fields)?;
        let payload = body
            .payload
            .filter(|p| !is_empty_payload(p))
            .ok_or_else(AppError::missing_fields)?;

        Ok(Self {
            sentinel_token,
            provider,
            payload,
        })
    }

    /// Parses raw request bytes. Anything that is not a JSON object with the
    /// three fields counts as a missing field.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AppError> {
        let body: ForwardRequestBody =
            serde_json::from_slice(bytes).map_err(|_| AppError::missing_fields())?;
        Self::from_body(body)
    }
}

/// Falsy scalars count as absent: `null`, `false`, `0` and `""`.
fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

/// The upstream answer relayed to the caller.
#[derive(Debug, Clone)]
pub struct ForwardResult {
    pub status: StatusCode,
    pub body: Value,
}
