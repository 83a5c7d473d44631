//! Login attempt model
//!
//! One row per authentication attempt. Rows are immutable except `resolved`,
//! which only ever moves from `false` to `true`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum stored user agent length, in characters
pub const MAX_USER_AGENT_CHARS: usize = 500;

/// Persisted login attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: i64,
    /// Resolved caller identity
    pub network_identity: String,
    /// Username as supplied, which may not exist
    pub account_name: String,
    pub user_agent: String,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
    /// Excluded from rate-limit counts once the account later signs in
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

/// Why a login attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    InvalidRole,
    UserNotFound,
    InvalidPassword,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::InvalidRole => "invalid role",
            FailureReason::UserNotFound => "user not found",
            FailureReason::InvalidPassword => "invalid password",
        }
    }
}

/// Input for appending an attempt to the ledger
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub network_identity: String,
    pub account_name: String,
    pub user_agent: String,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewAttempt {
    pub fn success(network_identity: &str, account_name: &str, user_agent: &str) -> Self {
        Self {
            network_identity: network_identity.to_string(),
            account_name: account_name.to_string(),
            user_agent: truncate_user_agent(user_agent),
            succeeded: true,
            failure_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn failure(
        network_identity: &str,
        account_name: &str,
        user_agent: &str,
        reason: FailureReason,
    ) -> Self {
        Self {
            network_identity: network_identity.to_string(),
            account_name: account_name.to_string(),
            user_agent: truncate_user_agent(user_agent),
            succeeded: false,
            failure_reason: Some(reason.as_str().to_string()),
            created_at: Utc::now(),
        }
    }

    /// Override the timestamp (backfills and tests)
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Cut a caller-supplied user agent to at most `MAX_USER_AGENT_CHARS` characters.
pub fn truncate_user_agent(user_agent: &str) -> String {
    user_agent.chars().take(MAX_USER_AGENT_CHARS).collect()
}
