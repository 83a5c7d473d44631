//! Password hashing
//!
//! Argon2id hashing and verification. Hashes are PHC strings, so the
//! algorithm parameters and salt travel with the stored hash.
//!
//! Accounts provisioned by user management carry bcrypt hashes
//! (`$2a$`, `$2b$`, `$2y$`); those verify through the `bcrypt` crate.
//! Both paths compare digests in constant time.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;

/// Hash verified when the account lookup misses, so a miss costs as much as
/// a wrong password.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| {
    match hash_password("schoolgate-timing-equaliser") {
        Ok(hash) => Some(hash),
        Err(e) => {
            tracing::error!("Failed to prepare dummy password hash: {}", e);
            None
        }
    }
});

/// Hash a password using Argon2id with the crate's default parameters.
///
/// Accounts are provisioned elsewhere; this is used for tests, seeding and
/// the timing equaliser.
///
/// ```ignore
/// use schoolgate::services::password::hash_password;
///
/// let hash = hash_password("rahasia")?;
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
        .context("Password hashing failed")?;

    Ok(password_hash.to_string())
}

const BCRYPT_PREFIXES: [&str; 3] = ["$2a$", "$2b$", "$2y$"];

/// Verify a password against a stored argon2 or bcrypt hash.
///
/// Returns `Ok(false)` on mismatch and an error only when the stored hash is
/// unreadable.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    if BCRYPT_PREFIXES.iter().any(|prefix| hash.starts_with(prefix)) {
        return bcrypt::verify(password, hash).context("Failed to verify bcrypt hash");
    }

    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    let argon2 = Argon2::default();

    match argon2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e))
            .context("Password verification error"),
    }
}

/// Burn one verification against a fixed hash. The result is discarded.
pub fn equalise_timing(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
}
