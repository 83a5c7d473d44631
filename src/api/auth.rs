//! Authentication API endpoints
//!
//! - POST /auth/login - Sign in, sets the session cookie
//! - POST /auth/logout - Clears the session cookie
//! - GET /auth/verify - Claims of the current session (requires auth)

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::services::identity::resolve_identity;
use crate::services::login::LoginRequest;

/// Request body for login. Missing fields are reported by the login service.
#[derive(Debug, Default, Deserialize)]
pub struct LoginBody {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: String,
    /// Hidden form field; bots fill it in
    #[serde(default)]
    pub honeypot: Option<String>,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/verify", get(verify))
}

/// POST /auth/login
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| {
        tracing::debug!("Rejected login body: {}", e);
        ApiError::validation_error("Username, password, and role are required")
    })?;

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let request = LoginRequest {
        username: body.username,
        password: body.password,
        role: body.role,
        honeypot: body.honeypot,
        network_identity: resolve_identity(&headers),
        user_agent,
    };

    let success = state.login_service.login(request).await?;

    let cookie = HeaderValue::from_str(&state.tokens.session_cookie(&success.token.token))
        .map_err(|e| {
            tracing::error!("Session cookie is not a valid header value: {}", e);
            ApiError::internal_error("Internal server error")
        })?;

    let mut response = Json(json!({
        "success": true,
        "user": success.user,
        "message": "Login successful",
    }))
    .into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

/// POST /auth/logout
async fn logout(State(state): State<AppState>) -> Result<Response, ApiError> {
    let cookie = HeaderValue::from_str(&state.tokens.clear_cookie())
        .map_err(|_| ApiError::internal_error("Internal server error"))?;

    let mut response = Json(json!({
        "success": true,
        "message": "Logout successful",
    }))
    .into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);
    Ok(response)
}

/// GET /auth/verify
async fn verify(AuthenticatedUser(claims): AuthenticatedUser) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "user": {
            "id": claims.sub,
            "username": claims.username,
            "role": claims.role,
            "permissions": claims.permissions,
        },
        "expiresAt": claims.exp,
    }))
}
