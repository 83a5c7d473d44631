//! Scheduled job endpoints
//!
//! - GET /cron/cleanup-logs - Delete attempt ledger rows past retention

use axum::{
    extract::State,
    http::{header, HeaderMap},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState};
use crate::services::retention::authorize_trigger;

pub fn router() -> Router<AppState> {
    Router::new().route("/cleanup-logs", get(cleanup_logs))
}

/// GET /cron/cleanup-logs
async fn cleanup_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    authorize_trigger(
        authorization,
        state.config.environment,
        state.config.retention.cron_secret.as_deref(),
    )
    .map_err(|e| {
        tracing::warn!("Rejected retention sweep trigger: {}", e);
        ApiError::unauthorized("Unauthorized")
    })?;

    let deleted = state.sweeper.sweep().await.map_err(|e| {
        tracing::error!("Retention sweep failed: {:#}", e);
        ApiError::internal_error("Internal Server Error")
    })?;

    Ok(Json(json!({
        "success": true,
        "deletedCount": deleted,
        "message": "Old logs cleaned up successfully",
    })))
}
