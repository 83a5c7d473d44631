//! Rate limiter for login attempts
//!
//! Protects against brute force along two independent dimensions, both
//! derived fresh from the attempt ledger on every call:
//! - per network identity (5 unresolved failures per 15 minutes by default)
//! - per account name (10 unresolved failures per 24 hours by default)
//!
//! Nothing is cached in process. Two concurrent requests may both read a count
//! just under the threshold and both pass; the overshoot is bounded by the
//! number of requests in flight.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use crate::config::RateLimitConfig;
use crate::db::repositories::AttemptRepository;

/// Which counter blocked the attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Identity,
    Account,
}

impl Dimension {
    /// Value reported to clients as `lockType`
    pub fn lock_type(self) -> &'static str {
        match self {
            Dimension::Identity => "ip",
            Dimension::Account => "account",
        }
    }
}

/// Result of evaluating both windows.
#[derive(Debug)]
pub enum RateLimitOutcome {
    Allowed {
        remaining: i64,
    },
    Blocked {
        dimension: Dimension,
        retry_after_secs: i64,
    },
    /// The ledger could not be read in time. The caller decides the policy.
    StoreError(anyhow::Error),
}

/// Flattened decision handed to the login flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: i64,
    pub retry_after_secs: i64,
    pub blocked_dimension: Option<Dimension>,
}

impl RateLimitDecision {
    pub fn allowed(remaining: i64) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after_secs: 0,
            blocked_dimension: None,
        }
    }

    pub fn blocked(dimension: Dimension, retry_after_secs: i64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after_secs,
            blocked_dimension: Some(dimension),
        }
    }
}

/// Ledger-backed login rate limiter
pub struct RateLimiter {
    attempts: Arc<dyn AttemptRepository>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(attempts: Arc<dyn AttemptRepository>, config: RateLimitConfig) -> Self {
        Self { attempts, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Evaluate the identity window, then the account window if a name was
    /// supplied.
    ///
    /// An identity block short-circuits: the account window is not read and
    /// only one dimension is ever reported.
    pub async fn check(&self, identity: &str, account_name: Option<&str>) -> RateLimitOutcome {
        let now = Utc::now();

        let identity_since = now - Duration::seconds(self.config.identity_window_secs);
        let identity_count = match self
            .bounded(self.attempts.count_failures_by_identity(identity, identity_since))
            .await
        {
            Ok(count) => count,
            Err(e) => return RateLimitOutcome::StoreError(e),
        };

        if identity_count >= self.config.identity_max_failures {
            return RateLimitOutcome::Blocked {
                dimension: Dimension::Identity,
                retry_after_secs: self.config.identity_window_secs,
            };
        }

        let identity_remaining = self.config.identity_max_failures - identity_count;

        let Some(account_name) = account_name else {
            return RateLimitOutcome::Allowed {
                remaining: identity_remaining,
            };
        };

        let account_since = now - Duration::seconds(self.config.account_window_secs);
        let account_count = match self
            .bounded(self.attempts.count_failures_by_account(account_name, account_since))
            .await
        {
            Ok(count) => count,
            Err(e) => return RateLimitOutcome::StoreError(e),
        };

        if account_count >= self.config.account_max_failures {
            return RateLimitOutcome::Blocked {
                dimension: Dimension::Account,
                retry_after_secs: self.config.account_window_secs,
            };
        }

        RateLimitOutcome::Allowed {
            remaining: identity_remaining.min(self.config.account_max_failures - account_count),
        }
    }

    /// Run a ledger query under the store timeout. Elapsing counts as a store failure.
    async fn bounded<F>(&self, query: F) -> anyhow::Result<i64>
    where
        F: Future<Output = anyhow::Result<i64>>,
    {
        let limit = std::time::Duration::from_millis(self.config.store_timeout_ms);
        match tokio::time::timeout(limit, query).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "Attempt ledger query timed out after {}ms",
                self.config.store_timeout_ms
            )),
        }
    }
}
