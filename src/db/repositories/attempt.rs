//! Attempt ledger repository
//!
//! Append-only storage of login attempts. Rows are only ever inserted,
//! flipped to `resolved`, or deleted by the retention sweeper.
//!
//! This module provides:
//! - `AttemptRepository` trait defining the ledger operations
//! - `SqlxAttemptRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{AttemptRecord, NewAttempt};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Attempt ledger trait
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Append an attempt, returning its id
    async fn insert(&self, attempt: &NewAttempt) -> Result<i64>;

    /// Count unresolved failures from `identity` created at or after `since`
    async fn count_failures_by_identity(&self, identity: &str, since: DateTime<Utc>)
        -> Result<i64>;

    /// Count unresolved failures against `account_name` created at or after `since`
    async fn count_failures_by_account(
        &self,
        account_name: &str,
        since: DateTime<Utc>,
    ) -> Result<i64>;

    /// Mark every unresolved failure for `account_name` as resolved.
    ///
    /// Returns the number of rows flipped.
    async fn resolve_failures(&self, account_name: &str) -> Result<u64>;

    /// Delete every row created strictly before `cutoff`
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Most recent attempts from one identity, newest first
    async fn list_by_identity(&self, identity: &str, limit: i64) -> Result<Vec<AttemptRecord>>;

    /// Most recent attempts against one account name, newest first
    async fn list_by_account(&self, account_name: &str, limit: i64) -> Result<Vec<AttemptRecord>>;

    /// Total rows in the ledger
    async fn count_all(&self) -> Result<i64>;

    /// Failed attempts (resolved or not) created at or after `since`
    async fn count_failures_since(&self, since: DateTime<Utc>) -> Result<i64>;
}

/// SQLx-based attempt ledger
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxAttemptRepository {
    pool: DynDatabasePool,
}

impl SqlxAttemptRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AttemptRepository> {
        Arc::new(Self::new(pool))
    }
}

const INSERT_SQL: &str = r#"
    INSERT INTO login_attempts (ip, username, user_agent, success, failure_reason, resolved, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

const COUNT_BY_IDENTITY_SQL: &str = r#"
    SELECT COUNT(*) FROM login_attempts
    WHERE ip = ? AND success = ? AND resolved = ? AND created_at >= ?
"#;

const COUNT_BY_ACCOUNT_SQL: &str = r#"
    SELECT COUNT(*) FROM login_attempts
    WHERE username = ? AND success = ? AND resolved = ? AND created_at >= ?
"#;

const RESOLVE_SQL: &str = r#"
    UPDATE login_attempts SET resolved = ?
    WHERE username = ? AND success = ? AND resolved = ?
"#;

const DELETE_BEFORE_SQL: &str = "DELETE FROM login_attempts WHERE created_at < ?";

const LIST_BY_IDENTITY_SQL: &str = r#"
    SELECT id, ip, username, user_agent, success, failure_reason, resolved, created_at
    FROM login_attempts
    WHERE ip = ?
    ORDER BY created_at DESC, id DESC
    LIMIT ?
"#;

const LIST_BY_ACCOUNT_SQL: &str = r#"
    SELECT id, ip, username, user_agent, success, failure_reason, resolved, created_at
    FROM login_attempts
    WHERE username = ?
    ORDER BY created_at DESC, id DESC
    LIMIT ?
"#;

const COUNT_ALL_SQL: &str = "SELECT COUNT(*) FROM login_attempts";

const COUNT_FAILURES_SINCE_SQL: &str =
    "SELECT COUNT(*) FROM login_attempts WHERE success = ? AND created_at >= ?";

#[async_trait]
impl AttemptRepository for SqlxAttemptRepository {
    async fn insert(&self, attempt: &NewAttempt) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => insert_attempt_sqlite(sqlite(&self.pool)?, attempt).await,
            DatabaseDriver::Mysql => insert_attempt_mysql(mysql(&self.pool)?, attempt).await,
        }
    }

    async fn count_failures_by_identity(
        &self,
        identity: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                count_failures_sqlite(sqlite(&self.pool)?, COUNT_BY_IDENTITY_SQL, identity, since)
                    .await
            }
            DatabaseDriver::Mysql => {
                count_failures_mysql(mysql(&self.pool)?, COUNT_BY_IDENTITY_SQL, identity, since)
                    .await
            }
        }
        .context("Failed to count failed attempts by identity")
    }

    async fn count_failures_by_account(
        &self,
        account_name: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                count_failures_sqlite(sqlite(&self.pool)?, COUNT_BY_ACCOUNT_SQL, account_name, since)
                    .await
            }
            DatabaseDriver::Mysql => {
                count_failures_mysql(mysql(&self.pool)?, COUNT_BY_ACCOUNT_SQL, account_name, since)
                    .await
            }
        }
        .context("Failed to count failed attempts by account")
    }

    async fn resolve_failures(&self, account_name: &str) -> Result<u64> {
        let result: Result<u64, sqlx::Error> = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(RESOLVE_SQL)
                    .bind(true)
                    .bind(account_name)
                    .bind(false)
                    .bind(false)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .map(|r| r.rows_affected())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(RESOLVE_SQL)
                    .bind(true)
                    .bind(account_name)
                    .bind(false)
                    .bind(false)
                    .execute(mysql(&self.pool)?)
                    .await
                    .map(|r| r.rows_affected())
            }
        };
        result.context("Failed to resolve failed attempts")
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result: Result<u64, sqlx::Error> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(DELETE_BEFORE_SQL)
                .bind(cutoff)
                .execute(sqlite(&self.pool)?)
                .await
                .map(|r| r.rows_affected()),
            DatabaseDriver::Mysql => sqlx::query(DELETE_BEFORE_SQL)
                .bind(cutoff)
                .execute(mysql(&self.pool)?)
                .await
                .map(|r| r.rows_affected()),
        };
        result.context("Failed to delete old attempts")
    }

    async fn list_by_identity(&self, identity: &str, limit: i64) -> Result<Vec<AttemptRecord>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_attempts_sqlite(sqlite(&self.pool)?, LIST_BY_IDENTITY_SQL, identity, limit)
                    .await
            }
            DatabaseDriver::Mysql => {
                list_attempts_mysql(mysql(&self.pool)?, LIST_BY_IDENTITY_SQL, identity, limit)
                    .await
            }
        }
    }

    async fn list_by_account(&self, account_name: &str, limit: i64) -> Result<Vec<AttemptRecord>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_attempts_sqlite(sqlite(&self.pool)?, LIST_BY_ACCOUNT_SQL, account_name, limit)
                    .await
            }
            DatabaseDriver::Mysql => {
                list_attempts_mysql(mysql(&self.pool)?, LIST_BY_ACCOUNT_SQL, account_name, limit)
                    .await
            }
        }
    }

    async fn count_all(&self) -> Result<i64> {
        let count: Result<i64, sqlx::Error> = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_scalar(COUNT_ALL_SQL)
                    .fetch_one(sqlite(&self.pool)?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_scalar(COUNT_ALL_SQL)
                    .fetch_one(mysql(&self.pool)?)
                    .await
            }
        };
        count.context("Failed to count attempts")
    }

    async fn count_failures_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let count: Result<i64, sqlx::Error> = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_scalar(COUNT_FAILURES_SINCE_SQL)
                    .bind(false)
                    .bind(since)
                    .fetch_one(sqlite(&self.pool)?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_scalar(COUNT_FAILURES_SINCE_SQL)
                    .bind(false)
                    .bind(since)
                    .fetch_one(mysql(&self.pool)?)
                    .await
            }
        };
        count.context("Failed to count recent failures")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_attempt_sqlite(pool: &SqlitePool, attempt: &NewAttempt) -> Result<i64> {
    let result = sqlx::query(INSERT_SQL)
        .bind(&attempt.network_identity)
        .bind(&attempt.account_name)
        .bind(&attempt.user_agent)
        .bind(attempt.succeeded)
        .bind(&attempt.failure_reason)
        .bind(false)
        .bind(attempt.created_at)
        .execute(pool)
        .await
        .context("Failed to insert login attempt")?;

    Ok(result.last_insert_rowid())
}

async fn count_failures_sqlite(
    pool: &SqlitePool,
    sql: &str,
    key: &str,
    since: DateTime<Utc>,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(sql)
        .bind(key)
        .bind(false)
        .bind(false)
        .bind(since)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

async fn list_attempts_sqlite(
    pool: &SqlitePool,
    sql: &str,
    key: &str,
    limit: i64,
) -> Result<Vec<AttemptRecord>> {
    let rows = sqlx::query(sql)
        .bind(key)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list login attempts")?;

    Ok(rows.iter().map(row_to_attempt_sqlite).collect())
}

fn row_to_attempt_sqlite(row: &sqlx::sqlite::SqliteRow) -> AttemptRecord {
    AttemptRecord {
        id: row.get("id"),
        network_identity: row.get("ip"),
        account_name: row.get("username"),
        user_agent: row.get("user_agent"),
        succeeded: row.get("success"),
        failure_reason: row.get("failure_reason"),
        resolved: row.get("resolved"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_attempt_mysql(pool: &MySqlPool, attempt: &NewAttempt) -> Result<i64> {
    let result = sqlx::query(INSERT_SQL)
        .bind(&attempt.network_identity)
        .bind(&attempt.account_name)
        .bind(&attempt.user_agent)
        .bind(attempt.succeeded)
        .bind(&attempt.failure_reason)
        .bind(false)
        .bind(attempt.created_at)
        .execute(pool)
        .await
        .context("Failed to insert login attempt")?;

    Ok(result.last_insert_id() as i64)
}

async fn count_failures_mysql(
    pool: &MySqlPool,
    sql: &str,
    key: &str,
    since: DateTime<Utc>,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(sql)
        .bind(key)
        .bind(false)
        .bind(false)
        .bind(since)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

async fn list_attempts_mysql(
    pool: &MySqlPool,
    sql: &str,
    key: &str,
    limit: i64,
) -> Result<Vec<AttemptRecord>> {
    let rows = sqlx::query(sql)
        .bind(key)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list login attempts")?;

    Ok(rows.iter().map(row_to_attempt_mysql).collect())
}

fn row_to_attempt_mysql(row: &sqlx::mysql::MySqlRow) -> AttemptRecord {
    AttemptRecord {
        id: row.get("id"),
        network_identity: row.get("ip"),
        account_name: row.get("username"),
        user_agent: row.get("user_agent"),
        succeeded: row.get("success"),
        failure_reason: row.get("failure_reason"),
        resolved: row.get("resolved"),
        created_at: row.get("created_at"),
    }
}
