//! Admin API endpoints
//!
//! - GET /admin/security/login-stats - Attempt ledger summary
//!
//! Optional `identity` or `username` query parameters add the most recent
//! ledger rows for that caller or account.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::AttemptRecord;

const RECENT_LIMIT: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new().route("/security/login-stats", get(login_stats))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub identity: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginStatsResponse {
    pub success: bool,
    pub total_attempts: i64,
    /// Failed attempts inside the per-identity window
    pub failed_in_identity_window: i64,
    /// Failed attempts inside the per-account window
    pub failed_in_account_window: i64,
    pub retention_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent: Option<Vec<AttemptRecord>>,
}

/// GET /admin/security/login-stats
async fn login_stats(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<StatsQuery>,
) -> Result<Json<LoginStatsResponse>, ApiError> {
    let limits = &state.config.rate_limit;
    let now = Utc::now();
    let internal = |e: anyhow::Error| {
        tracing::error!("Failed to read login stats: {:#}", e);
        ApiError::internal_error("Internal server error")
    };

    let total_attempts = state.attempts.count_all().await.map_err(internal)?;
    let failed_in_identity_window = state
        .attempts
        .count_failures_since(now - Duration::seconds(limits.identity_window_secs))
        .await
        .map_err(internal)?;
    let failed_in_account_window = state
        .attempts
        .count_failures_since(now - Duration::seconds(limits.account_window_secs))
        .await
        .map_err(internal)?;

    let recent = match (query.identity.as_deref(), query.username.as_deref()) {
        (Some(identity), _) => Some(
            state
                .attempts
                .list_by_identity(identity, RECENT_LIMIT)
                .await
                .map_err(internal)?,
        ),
        (None, Some(username)) => Some(
            state
                .attempts
                .list_by_account(username, RECENT_LIMIT)
                .await
                .map_err(internal)?,
        ),
        (None, None) => None,
    };

    tracing::info!("Login stats viewed by '{}'", claims.username);

    Ok(Json(LoginStatsResponse {
        success: true,
        total_attempts,
        failed_in_identity_window,
        failed_in_account_window,
        retention_days: state.sweeper.retention_days(),
        recent,
    }))
}
