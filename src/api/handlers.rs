use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::AppError;
use crate::models::credential::{
    generate_sentinel_token, CredentialView, NewCredential, DEFAULT_RATE_LIMIT,
};
use crate::store::CredentialStore;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyRequest {
    pub user_id: String,
    pub name: String,
    pub provider: String,
    pub api_key: String,
    pub description: Option<String>,
    pub notify_email: Option<String>,
    pub rate_limit: Option<u64>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyResponse {
    pub id: String,
    pub sentinel_key: String,
    pub name: String,
    pub provider: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListKeysParams {
    pub user_id: Option<String>,
}

fn require_store(state: &AppState) -> Result<&Arc<dyn CredentialStore>, AppError> {
    state.store.as_ref().ok_or(AppError::StoreNotConfigured)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /api/v1/keys — store a credential and mint its sentinel token
#[tracing::instrument(skip_all)]
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<CreateKeyResponse>), AppError> {
    let store = require_store(&state)?;

    if payload.user_id.trim().is_empty()
        || payload.name.trim().is_empty()
        || payload.api_key.trim().is_empty()
    {
        return Err(AppError::BadRequest("Invalid API key data".into()));
    }
    if !state.registry.contains(&payload.provider) {
        tracing::warn!("create_key: unsupported provider");
        return Err(AppError::unsupported_provider(&payload.provider));
    }

    let cred = store
        .create_credential(NewCredential {
            owner_id: payload.user_id,
            name: payload.name,
            provider: payload.provider,
            api_key: payload.api_key,
            description: non_blank(payload.description),
            notify_email: non_blank(payload.notify_email),
            rate_limit: payload.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT),
            scopes: payload.scopes,
        })
        .await?;

    let token = generate_sentinel_token(&cred.id);
    if let Err(e) = store.create_sentinel(&token, &cred.id).await {
        // Roll back so no credential exists without a token.
        if let Err(cleanup) = store.delete_credential(&cred.id).await {
            tracing::error!(credential_id = %cred.id, "create_key: rollback failed: {}", cleanup);
        }
        return Err(AppError::Internal(e));
    }

    tracing::info!(credential_id = %cred.id, "credential created");

    Ok((
        StatusCode::CREATED,
        Json(CreateKeyResponse {
            id: cred.id,
            sentinel_key: token,
            name: cred.name,
            provider: cred.provider,
        }),
    ))
}

/// GET /api/v1/keys?userId=… — list an owner's credentials (secrets masked)
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListKeysParams>,
) -> Result<Json<Vec<CredentialView>>, AppError> {
    let store = require_store(&state)?;
    let owner = non_blank(params.user_id)
        .ok_or_else(|| AppError::BadRequest("Missing userId".into()))?;

    let keys = store
        .list_credentials(&owner)
        .await?
        .into_iter()
        .map(|(cred, sentinel)| CredentialView::new(&cred, sentinel))
        .collect();

    Ok(Json(keys))
}

/// DELETE /api/v1/keys/:id — remove a credential and its sentinel tokens
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let store = require_store(&state)?;
    if !store.delete_credential(&id).await? {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "API key not found" })),
        )
            .into_response());
    }
    tracing::info!(credential_id = %id, "credential deleted");
    Ok(Json(json!({ "success": true })).into_response())
}

/// GET /api/v1/providers — registered provider ids
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.registry.ids().into_iter().map(String::from).collect())
}
