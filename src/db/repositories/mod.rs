//! Database repositories
//!
//! Repository pattern implementations for database access.
//! The attempt ledger is the only table this service writes; accounts are
//! read-only.

pub mod account;
pub mod attempt;

pub use account::{AccountRepository, SqlxAccountRepository};
pub use attempt::{AttemptRepository, SqlxAttemptRepository};
