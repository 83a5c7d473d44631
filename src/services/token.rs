//! Session token issuer
//!
//! Tokens are compact HS256 JWTs. They are self-contained and never stored;
//! every authenticated request re-verifies the signature and expiry. There
//! is no revocation list, so a token stays valid until `exp`.

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use uuid::Uuid;

use crate::config::{AuthConfig, CookieConfig};
use crate::models::{AccountView, InternalRole, SessionClaims};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Unsupported token algorithm")]
    UnsupportedAlgorithm,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::MissingAlgorithm
            | ErrorKind::InvalidAlgorithmName => TokenError::UnsupportedAlgorithm,
            _ => TokenError::Malformed,
        }
    }
}

/// Signed token with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: SessionClaims,
}

/// Mints and verifies session tokens and renders the session cookie.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_secs: i64,
    cookie: CookieConfig,
}

impl TokenIssuer {
    pub fn new(secret: Vec<u8>, auth: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // No clock skew allowance on `exp`
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(&secret),
            decoding_key: DecodingKey::from_secret(&secret),
            validation,
            ttl_secs: auth.token_ttl_secs,
            cookie: auth.cookie.clone(),
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie.name
    }

    /// Mint a token for a verified account.
    ///
    /// `requested_role` supplies the external label; permissions come from
    /// the account's own role.
    pub fn issue(
        &self,
        account: &AccountView,
        requested_role: InternalRole,
        network_identity: &str,
    ) -> Result<IssuedToken, TokenError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: account.id.to_string(),
            username: account.username.clone(),
            role: requested_role.external_label().to_string(),
            permissions: account.role.permissions(),
            iat: now,
            exp: now + self.ttl_secs,
            ip: network_identity.to_string(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok(IssuedToken { token, claims })
    }

    /// Check signature, algorithm and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)?;

        if data.claims.is_expired() {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }

    /// `Set-Cookie` value delivering the token
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; Path={}; HttpOnly; Secure; SameSite={}; Max-Age={}",
            self.cookie.name,
            token,
            self.cookie.path,
            self.cookie.same_site.as_str(),
            self.ttl_secs
        )
    }

    /// `Set-Cookie` value that expires the session cookie
    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; Path={}; HttpOnly; Secure; SameSite={}; Max-Age=0",
            self.cookie.name,
            self.cookie.path,
            self.cookie.same_site.as_str()
        )
    }
}
