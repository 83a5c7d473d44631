//! Session token claims

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Claims carried by a signed session token.
///
/// Tokens are self-contained: nothing about a session is stored server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Account id
    pub sub: String,
    pub username: String,
    /// External role label, e.g. `"ppdb-officer"`
    pub role: String,
    pub permissions: Vec<String>,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
    /// Network identity the token was issued to
    pub ip: String,
    /// Token id
    pub jti: String,
}

impl SessionClaims {
    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}
