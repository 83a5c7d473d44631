//! Account repository
//!
//! Read-only account lookups for credential verification. Accounts are
//! written by user management; nothing here inserts or updates them.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{Account, InternalRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Account lookup trait
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Find the account signing in as `role`.
    ///
    /// The role is part of the key: a username held under another role is
    /// reported as missing. For OSIS sign-in a student account with
    /// `osis_access` also matches.
    async fn find_for_login(&self, username: &str, role: InternalRole) -> Result<Option<Account>>;
}

/// SQLx-based account lookup
pub struct SqlxAccountRepository {
    pool: DynDatabasePool,
}

impl SqlxAccountRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AccountRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_ACCOUNT_SQL: &str = r#"
    SELECT u.id, u.username, u.email, u.password_hash, u.role,
           p.full_name, COALESCE(p.osis_access, 0) AS osis_access
    FROM users u
    LEFT JOIN user_profiles p ON p.user_id = u.id
    WHERE u.username = ? AND u.role = ?
"#;

// MySQL BOOLEAN is TINYINT(1); cast so the column always decodes as i64
const SELECT_ACCOUNT_SQL_MYSQL: &str = r#"
    SELECT u.id, u.username, u.email, u.password_hash, u.role,
           p.full_name, CAST(COALESCE(p.osis_access, 0) AS SIGNED) AS osis_access
    FROM users u
    LEFT JOIN user_profiles p ON p.user_id = u.id
    WHERE u.username = ? AND u.role = ?
"#;

#[async_trait]
impl AccountRepository for SqlxAccountRepository {
    async fn find_for_login(&self, username: &str, role: InternalRole) -> Result<Option<Account>> {
        for candidate in role.lookup_roles() {
            let found = match self.pool.driver() {
                DatabaseDriver::Sqlite => {
                    find_account_sqlite(sqlite(&self.pool)?, username, *candidate).await?
                }
                DatabaseDriver::Mysql => {
                    find_account_mysql(mysql(&self.pool)?, username, *candidate).await?
                }
            };

            if let Some(account) = found {
                // Alternate roles only count when the profile grants access
                let granted = *candidate == role
                    || (role == InternalRole::Osis
                        && account.role == InternalRole::Siswa
                        && account.osis_access);
                if granted {
                    return Ok(Some(account));
                }
            }
        }

        Ok(None)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn find_account_sqlite(
    pool: &SqlitePool,
    username: &str,
    role: InternalRole,
) -> Result<Option<Account>> {
    let row = sqlx::query(SELECT_ACCOUNT_SQL)
        .bind(username)
        .bind(role.db_value())
        .fetch_optional(pool)
        .await
        .context("Failed to look up account")?;

    match row {
        Some(row) => {
            let role: String = row.get("role");
            Ok(Some(Account {
                id: row.get("id"),
                username: row.get("username"),
                email: row.get("email"),
                password_hash: row.get("password_hash"),
                role: InternalRole::from_str(&role)?,
                full_name: row.get("full_name"),
                osis_access: row.get("osis_access"),
            }))
        }
        None => Ok(None),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn find_account_mysql(
    pool: &MySqlPool,
    username: &str,
    role: InternalRole,
) -> Result<Option<Account>> {
    let row = sqlx::query(SELECT_ACCOUNT_SQL_MYSQL)
        .bind(username)
        .bind(role.db_value())
        .fetch_optional(pool)
        .await
        .context("Failed to look up account")?;

    match row {
        Some(row) => {
            let role: String = row.get("role");
            let osis_access: i64 = row.get("osis_access");
            Ok(Some(Account {
                id: row.get("id"),
                username: row.get("username"),
                email: row.get("email"),
                password_hash: row.get("password_hash"),
                role: InternalRole::from_str(&role)?,
                full_name: row.get("full_name"),
                osis_access: osis_access != 0,
            }))
        }
        None => Ok(None),
    }
}
