//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error type every handler returns
//! - Authentication (session cookie validation) and role checks

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{AttemptRepository, SqlxAccountRepository, SqlxAttemptRepository};
use crate::db::DynDatabasePool;
use crate::models::{InternalRole, SessionClaims};
use crate::services::login::{LoginError, INVALID_CREDENTIALS};
use crate::services::{
    CredentialVerifier, Dimension, LoginService, RateLimiter, RetentionSweeper,
    SecurityEventLog, SecurityEventSink, TokenIssuer,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub login_service: Arc<LoginService>,
    pub tokens: Arc<TokenIssuer>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub sweeper: Arc<RetentionSweeper>,
}

impl AppState {
    /// Wire the login pipeline from configuration and a migrated pool.
    ///
    /// Must be called inside a Tokio runtime: it spawns the security event worker.
    pub fn build(
        config: Config,
        pool: DynDatabasePool,
        sink: Arc<dyn SecurityEventSink>,
    ) -> anyhow::Result<Self> {
        let secret = config.signing_secret()?;
        let tokens = Arc::new(TokenIssuer::new(secret, &config.auth));

        let attempts = SqlxAttemptRepository::boxed(pool.clone());
        let accounts = SqlxAccountRepository::boxed(pool);

        let (events, _worker) = SecurityEventLog::spawn(config.security_log.channel_capacity, sink);

        let login_service = LoginService::new(
            RateLimiter::new(attempts.clone(), config.rate_limit.clone()),
            CredentialVerifier::new(accounts),
            attempts.clone(),
            tokens.clone(),
            events,
        );
        let sweeper = RetentionSweeper::new(attempts.clone(), config.retention.retention_days);

        Ok(Self {
            config: Arc::new(config),
            login_service: Arc::new(login_service),
            tokens,
            attempts,
            sweeper: Arc::new(sweeper),
        })
    }
}

/// Claims of the verified session cookie
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub SessionClaims);

/// Error response for API errors.
///
/// Serialized as `{ "success": false, "code": .., "error": .., ...details }`.
#[derive(Debug)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub details: Option<Map<String, Value>>,
    /// Emitted as a `Retry-After` header
    pub retry_after: Option<i64>,
}

#[derive(Serialize)]
struct ApiErrorBody<'a> {
    success: bool,
    code: &'a str,
    error: &'a str,
    #[serde(flatten)]
    details: Option<&'a Map<String, Value>>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    /// Attach extra top-level fields. Non-object values are ignored.
    pub fn with_details(mut self, details: Value) -> Self {
        if let Value::Object(map) = details {
            self.details = Some(map);
        }
        self
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "ACCOUNT_LOCKED" => StatusCode::LOCKED,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            success: false,
            code: &self.code,
            error: &self.message,
            details: self.details.as_ref(),
        };
        let mut response = (self.status(), Json(body)).into_response();

        if let Some(secs) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<LoginError> for ApiError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::Validation(message) => ApiError::validation_error(message),
            LoginError::BotDetected => ApiError::validation_error("Security check failed"),
            LoginError::InvalidRole => ApiError::validation_error("Invalid role"),
            LoginError::InvalidCredentials => ApiError::unauthorized(INVALID_CREDENTIALS),
            LoginError::RateLimited {
                dimension,
                retry_after_secs,
                remaining,
            } => {
                let (code, message) = match dimension {
                    Dimension::Identity => (
                        "RATE_LIMITED",
                        "Too many login attempts. Please try again later.",
                    ),
                    Dimension::Account => (
                        "ACCOUNT_LOCKED",
                        "Account temporarily locked due to too many failed attempts. Please try again later.",
                    ),
                };
                let mut api_error = ApiError::new(code, message).with_details(json!({
                    "remainingAttempts": remaining,
                    "retryAfter": retry_after_secs,
                    "lockType": dimension.lock_type(),
                }));
                api_error.retry_after = Some(retry_after_secs);
                api_error
            }
            // Details stay in the server log
            LoginError::Internal(_) => ApiError::internal_error("Internal server error"),
        }
    }
}

/// Read a cookie value by name from every `Cookie` header.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Authentication middleware
///
/// Verifies the session cookie and stores its claims for [`AuthenticatedUser`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = cookie_value(request.headers(), state.tokens.cookie_name())
        .ok_or_else(|| ApiError::unauthorized("No token found"))?;

    let claims = state.tokens.verify(&token).map_err(|e| {
        tracing::debug!("Rejected session token: {}", e);
        ApiError::unauthorized("Invalid token")
    })?;

    request.extensions_mut().insert(AuthenticatedUser(claims));
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Allow only sessions whose role label belongs to one of `allowed`.
pub fn require_role(user: &AuthenticatedUser, allowed: &[InternalRole]) -> Result<(), ApiError> {
    let permitted = allowed
        .iter()
        .any(|role| role.external_label() == user.0.role);
    if permitted {
        Ok(())
    } else {
        Err(ApiError::forbidden("Insufficient role"))
    }
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    require_role(user, &[InternalRole::Admin])?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::new("RATE_LIMITED", "x").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::new("ACCOUNT_LOCKED", "x").status(), StatusCode::LOCKED);
        assert_eq!(ApiError::internal_error("x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_rate_limited_body_and_header() {
        let err: ApiError = LoginError::RateLimited {
            dimension: Dimension::Account,
            retry_after_secs: 86400,
            remaining: 0,
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::LOCKED);
        assert_eq!(response.headers()[header::RETRY_AFTER], "86400");

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["lockType"], "account");
        assert_eq!(body["retryAfter"], 86400);
        assert_eq!(body["remainingAttempts"], 0);
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let err: ApiError = LoginError::Internal(anyhow::anyhow!("database is locked")).into();
        let body = body_json(err.into_response()).await;
        assert_eq!(body["error"], "Internal server error");
        assert!(!body.to_string().contains("locked"));
    }

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; auth-token=abc.def"));
        headers.append(header::COOKIE, HeaderValue::from_static("other=1"));
        assert_eq!(cookie_value(&headers, "auth-token").as_deref(), Some("abc.def"));
        assert_eq!(cookie_value(&headers, "other").as_deref(), Some("1"));
        assert!(cookie_value(&headers, "auth").is_none());

        let mut cleared = HeaderMap::new();
        cleared.insert(header::COOKIE, HeaderValue::from_static("auth-token="));
        assert!(cookie_value(&cleared, "auth-token").is_none());
    }

    #[test]
    fn test_require_role() {
        let claims = SessionClaims {
            sub: "1".to_string(),
            username: "ppdb001".to_string(),
            role: "ppdb-officer".to_string(),
            permissions: vec![],
            iat: 0,
            exp: i64::MAX,
            ip: "x".to_string(),
            jti: "j".to_string(),
        };
        let user = AuthenticatedUser(claims);
        assert!(require_role(&user, &[InternalRole::PpdbStaff]).is_ok());
        assert!(require_role(&user, &[InternalRole::Admin, InternalRole::Kesiswaan]).is_err());
    }
}
