//! Driver-id maintenance and token diagnostics.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use driverledger_core::RewriteCounts;
use serde::{Deserialize, Serialize};

use super::ApiResult;
use crate::auth::{AuthError, KeyProbe, RequireUser, extract_from_header};
use crate::server::AppState;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/normalize-driver-ids", post(normalize_driver_ids))
        .route("/admin/merge-driver-ids", post(merge_driver_ids))
}

pub(super) fn debug_routes() -> Router<AppState> {
    Router::new().route("/debug/token-info", get(token_info))
}

#[derive(Debug, Serialize)]
struct RewriteResponse {
    message: &'static str,
    updated: RewriteCounts,
    total: usize,
}

impl From<RewriteCounts> for RewriteResponse {
    fn from(counts: RewriteCounts) -> Self {
        Self {
            message: "Driver ids updated",
            total: counts.total(),
            updated: counts,
        }
    }
}

async fn normalize_driver_ids(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
) -> ApiResult<Json<RewriteResponse>> {
    tracing::info!(user = %identity.user.id, "normalizing driver ids");
    let counts = state.ledger.normalize_driver_ids().await?;
    Ok(Json(counts.into()))
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    #[serde(default)]
    source_id: String,
    #[serde(default)]
    target_id: String,
}

async fn merge_driver_ids(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    Json(request): Json<MergeRequest>,
) -> ApiResult<Json<RewriteResponse>> {
    tracing::info!(user = %identity.user.id, "merging driver ids");
    let counts = state
        .ledger
        .merge_driver_ids(&request.source_id, &request.target_id)
        .await?;
    Ok(Json(counts.into()))
}

#[derive(Debug, Serialize)]
struct TokenInfo {
    token_preview: String,
    results: Vec<KeyProbe>,
    current_time: DateTime<Utc>,
}

async fn token_info(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<TokenInfo>> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_from_header)
        .ok_or(AuthError::MissingCredentials)?;

    let preview: String = token.chars().take(10).collect();
    Ok(Json(TokenInfo {
        token_preview: format!("{preview}..."),
        results: state.auth.verifier.inspect(token),
        current_time: Utc::now(),
    }))
}
