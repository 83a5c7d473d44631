//! Login service
//!
//! Orchestrates one login attempt:
//! honeypot and field checks, rate limit, credential verification, ledger
//! write, resolution of earlier failures and token issuance.
//!
//! Every terminal branch after the rate-limit check writes exactly one ledger
//! row. A blocked attempt writes none.

use serde::Serialize;
use std::sync::Arc;

use crate::db::repositories::AttemptRepository;
use crate::models::{FailureReason, NewAttempt};
use crate::services::credentials::{CredentialVerifier, VerifyOutcome};
use crate::services::rate_limiter::{Dimension, RateLimitDecision, RateLimitOutcome, RateLimiter};
use crate::services::security_log::{SecurityEvent, SecurityEventKind, SecurityEventLog};
use crate::services::token::{IssuedToken, TokenIssuer};

/// Generic message for every credential failure
pub const INVALID_CREDENTIALS: &str = "Invalid credentials or role";

/// Error types for login operations
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// Missing or malformed fields
    #[error("{0}")]
    Validation(String),

    /// Honeypot field was filled in
    #[error("Security check failed")]
    BotDetected,

    #[error("Invalid role")]
    InvalidRole,

    /// Unknown account, wrong role or wrong password
    #[error("Invalid credentials or role")]
    InvalidCredentials,

    #[error("Too many login attempts")]
    RateLimited {
        dimension: Dimension,
        retry_after_secs: i64,
        remaining: i64,
    },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Login input as received, plus the request context
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub role: String,
    pub honeypot: Option<String>,
    pub network_identity: String,
    pub user_agent: String,
}

/// Non-secret account fields returned to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginUser {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub role: String,
    pub email: Option<String>,
    pub permissions: Vec<String>,
}

/// Successful login: the public user view and the token for the cookie
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub user: LoginUser,
    pub token: IssuedToken,
}

pub struct LoginService {
    limiter: RateLimiter,
    verifier: CredentialVerifier,
    attempts: Arc<dyn AttemptRepository>,
    tokens: Arc<TokenIssuer>,
    events: SecurityEventLog,
}

impl LoginService {
    pub fn new(
        limiter: RateLimiter,
        verifier: CredentialVerifier,
        attempts: Arc<dyn AttemptRepository>,
        tokens: Arc<TokenIssuer>,
        events: SecurityEventLog,
    ) -> Self {
        Self {
            limiter,
            verifier,
            attempts,
            tokens,
            events,
        }
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginSuccess, LoginError> {
        let identity = request.network_identity.as_str();
        let user_agent = request.user_agent.as_str();

        if request.honeypot.as_deref().is_some_and(|v| !v.is_empty()) {
            self.events.record(
                SecurityEvent::new(SecurityEventKind::BotDetected, identity)
                    .account(&request.username)
                    .user_agent(user_agent),
            );
            return Err(LoginError::BotDetected);
        }

        if request.username.trim().is_empty()
            || request.password.is_empty()
            || request.role.trim().is_empty()
        {
            tracing::info!("Login rejected from {}: missing credentials", identity);
            return Err(LoginError::Validation(
                "Username, password, and role are required".to_string(),
            ));
        }

        let username = request.username.trim();

        let decision = self.rate_decision(identity, username).await;
        if let Some(dimension) = decision.blocked_dimension {
            let kind = match dimension {
                Dimension::Identity => SecurityEventKind::RateLimited,
                Dimension::Account => SecurityEventKind::AccountLocked,
            };
            self.events.record(
                SecurityEvent::new(kind, identity)
                    .account(username)
                    .user_agent(user_agent)
                    .detail(format!("retry after {}s", decision.retry_after_secs)),
            );
            return Err(LoginError::RateLimited {
                dimension,
                retry_after_secs: decision.retry_after_secs,
                remaining: decision.remaining,
            });
        }

        // Store and hash failures fail closed: no ledger row, no token
        let outcome = self
            .verifier
            .verify(username, &request.password, request.role.trim())
            .await
            .map_err(|e| {
                tracing::error!("Credential verification failed for '{}': {:#}", username, e);
                LoginError::Internal(e)
            })?;

        let (account, requested_role) = match outcome {
            VerifyOutcome::Verified {
                account,
                requested_role,
            } => (account, requested_role),
            VerifyOutcome::Rejected(reason) => {
                tracing::info!(
                    "Login failed for '{}' from {}: {}",
                    username,
                    identity,
                    reason.as_str()
                );
                self.append(NewAttempt::failure(identity, username, user_agent, reason))
                    .await;
                self.events.record(
                    SecurityEvent::new(SecurityEventKind::LoginFailed, identity)
                        .account(username)
                        .user_agent(user_agent)
                        .detail(reason.as_str()),
                );
                return Err(match reason {
                    FailureReason::InvalidRole => LoginError::InvalidRole,
                    FailureReason::UserNotFound | FailureReason::InvalidPassword => {
                        LoginError::InvalidCredentials
                    }
                });
            }
        };

        self.append(NewAttempt::success(identity, username, user_agent))
            .await;

        match self.attempts.resolve_failures(username).await {
            Ok(resolved) if resolved > 0 => {
                tracing::debug!("Resolved {} earlier failures for '{}'", resolved, username)
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to resolve earlier failures for '{}': {:#}", username, e),
        }

        let token = self
            .tokens
            .issue(&account, requested_role, identity)
            .map_err(|e| {
                tracing::error!("Token issuance failed for '{}': {}", username, e);
                LoginError::Internal(anyhow::anyhow!(e))
            })?;

        self.events.record(
            SecurityEvent::new(SecurityEventKind::LoginSuccess, identity)
                .account(username)
                .user_agent(user_agent)
                .detail(format!("jti {}", token.claims.jti)),
        );
        tracing::info!(
            "Login succeeded for '{}' as {} from {}",
            username,
            token.claims.role,
            identity
        );

        let user = LoginUser {
            id: account.id,
            username: account.username,
            name: account.display_name,
            role: token.claims.role.clone(),
            email: account.email,
            permissions: token.claims.permissions.clone(),
        };
        Ok(LoginSuccess { user, token })
    }

    /// The only place the limiter's store failures are turned into a decision.
    async fn rate_decision(&self, identity: &str, username: &str) -> RateLimitDecision {
        match self.limiter.check(identity, Some(username)).await {
            RateLimitOutcome::Allowed { remaining } => RateLimitDecision::allowed(remaining),
            RateLimitOutcome::Blocked {
                dimension,
                retry_after_secs,
            } => RateLimitDecision::blocked(dimension, retry_after_secs),
            RateLimitOutcome::StoreError(e) => {
                // Fail open: a ledger outage must not lock everyone out
                tracing::error!("Rate limiter unavailable, allowing attempt: {:#}", e);
                RateLimitDecision::allowed(1)
            }
        }
    }

    /// Append to the ledger. A failed write is logged and the login continues.
    async fn append(&self, attempt: NewAttempt) {
        if let Err(e) = self.attempts.insert(&attempt).await {
            tracing::error!(
                "Failed to record login attempt for '{}': {:#}",
                attempt.account_name,
                e
            );
        }
    }
}
