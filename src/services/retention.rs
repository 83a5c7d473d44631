//! Attempt ledger retention
//!
//! Deletes ledger rows older than the retention horizon, resolved or not.
//! The cutoff is fixed once per run, so a sweep never chases rows written
//! while it is executing and is safe to run alongside live logins.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::Environment;
use crate::db::repositories::AttemptRepository;

pub struct RetentionSweeper {
    attempts: Arc<dyn AttemptRepository>,
    retention_days: i64,
}

impl RetentionSweeper {
    pub fn new(attempts: Arc<dyn AttemptRepository>, retention_days: i64) -> Self {
        Self {
            attempts,
            retention_days,
        }
    }

    pub fn retention_days(&self) -> i64 {
        self.retention_days
    }

    /// Delete every row created before `now - retention_days`. Returns the count.
    pub async fn sweep(&self) -> Result<u64> {
        self.sweep_at(Utc::now()).await
    }

    async fn sweep_at(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - Duration::days(self.retention_days);
        let deleted = self.attempts.delete_before(cutoff).await?;
        tracing::info!(
            "Retention sweep removed {} login attempts older than {}",
            deleted,
            cutoff.to_rfc3339()
        );
        Ok(deleted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CronAuthError {
    #[error("Missing bearer credential")]
    Missing,
    #[error("Bearer credential does not match")]
    Mismatch,
    #[error("Cron secret is not configured")]
    NotConfigured,
}

/// Check the `Authorization` header of a sweep trigger.
///
/// Production always requires `Bearer <secret>` and rejects everything if no
/// secret is configured. Development only checks when a secret is set.
pub fn authorize_trigger(
    authorization: Option<&str>,
    environment: Environment,
    cron_secret: Option<&str>,
) -> Result<(), CronAuthError> {
    let Some(secret) = cron_secret else {
        return if environment.is_production() {
            Err(CronAuthError::NotConfigured)
        } else {
            Ok(())
        };
    };

    let presented = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(CronAuthError::Missing)?;

    // Compare fixed-length digests so timing does not leak the secret length
    if Sha256::digest(presented.as_bytes()) == Sha256::digest(secret.as_bytes()) {
        Ok(())
    } else {
        Err(CronAuthError::Mismatch)
    }
}
