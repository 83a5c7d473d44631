//! Account model
//!
//! Accounts are created by user management elsewhere; the login pipeline only
//! reads them.

use serde::Serialize;

use super::InternalRole;

/// Account row joined with the profile fields login needs.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: InternalRole,
    /// Full name from the profile, if any
    pub full_name: Option<String>,
    /// Student granted OSIS dashboard access
    pub osis_access: bool,
}

impl Account {
    /// Name shown in the UI: profile name when present, else the username.
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.username,
        }
    }

    /// Strip the secret hash for use past credential verification.
    pub fn view(&self) -> AccountView {
        AccountView {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name().to_string(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Verified account without its password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountView {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub role: InternalRole,
}
