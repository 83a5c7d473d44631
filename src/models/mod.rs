//! Data models
//!
//! Data structures shared by the login pipeline:
//! - Database entities (AttemptRecord, Account)
//! - The role lookup table
//! - Session token claims

mod account;
mod attempt;
mod role;
mod session;

pub use account::{Account, AccountView};
pub use attempt::{
    truncate_user_agent, AttemptRecord, FailureReason, NewAttempt, MAX_USER_AGENT_CHARS,
};
pub use role::{InternalRole, RoleProfile};
pub use session::SessionClaims;
