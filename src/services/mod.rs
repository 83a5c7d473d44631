//! Services layer - Business logic
//!
//! The login security pipeline, leaves first:
//! - Identity resolution from proxy headers
//! - Ledger-backed rate limiting
//! - Credential verification and password hashing
//! - Session token issuance
//! - Security event channel
//! - Ledger retention
//! - Login orchestration

pub mod credentials;
pub mod identity;
pub mod login;
pub mod password;
pub mod rate_limiter;
pub mod retention;
pub mod security_log;
pub mod token;

pub use credentials::{CredentialVerifier, VerifyOutcome};
pub use identity::resolve_identity;
pub use login::{LoginError, LoginRequest, LoginService, LoginSuccess, LoginUser};
pub use password::{hash_password, verify_password};
pub use rate_limiter::{Dimension, RateLimitDecision, RateLimitOutcome, RateLimiter};
pub use retention::{authorize_trigger, CronAuthError, RetentionSweeper};
pub use security_log::{
    SecurityEvent, SecurityEventKind, SecurityEventLog, SecurityEventSink, TracingSink,
};
pub use token::{IssuedToken, TokenError, TokenIssuer};
