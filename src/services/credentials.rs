//! Credential verification
//!
//! Maps the requested role label, looks the account up by `(name, role)` and
//! checks the password. The role is part of the lookup key, so a valid
//! password presented under the wrong role looks exactly like an unknown user.

use anyhow::Result;
use std::sync::Arc;

use crate::db::repositories::AccountRepository;
use crate::models::{AccountView, FailureReason, InternalRole};
use crate::services::password::{equalise_timing, verify_password};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified {
        account: AccountView,
        requested_role: InternalRole,
    },
    Rejected(FailureReason),
}

pub struct CredentialVerifier {
    accounts: Arc<dyn AccountRepository>,
}

impl CredentialVerifier {
    pub fn new(accounts: Arc<dyn AccountRepository>) -> Self {
        Self { accounts }
    }

    /// Verify a name, secret and external role label.
    ///
    /// `Err` means the account store or a stored hash could not be read; the
    /// caller must not treat that as success.
    pub async fn verify(
        &self,
        account_name: &str,
        secret: &str,
        requested_role: &str,
    ) -> Result<VerifyOutcome> {
        let Some(role) = InternalRole::from_external_label(requested_role) else {
            return Ok(VerifyOutcome::Rejected(FailureReason::InvalidRole));
        };

        let Some(account) = self.accounts.find_for_login(account_name, role).await? else {
            equalise_timing(secret);
            return Ok(VerifyOutcome::Rejected(FailureReason::UserNotFound));
        };

        if !verify_password(secret, &account.password_hash)? {
            return Ok(VerifyOutcome::Rejected(FailureReason::InvalidPassword));
        }

        Ok(VerifyOutcome::Verified {
            account: account.view(),
            requested_role: role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::account::tests::insert_account;
    use crate::db::repositories::SqlxAccountRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::services::password::hash_password;

    async fn setup() -> CredentialVerifier {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let hash = hash_password("benar123").unwrap();
        insert_account(&pool, "alice", InternalRole::Kesiswaan, &hash, Some("Alice W."), false).await;
        insert_account(&pool, "rina", InternalRole::Siswa, &hash, None, true).await;

        CredentialVerifier::new(SqlxAccountRepository::boxed(pool))
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let verifier = setup().await;
        match verifier.verify("alice", "benar123", "kesiswaan").await.unwrap() {
            VerifyOutcome::Verified {
                account,
                requested_role,
            } => {
                assert_eq!(account.username, "alice");
                assert_eq!(account.display_name, "Alice W.");
                assert_eq!(requested_role, InternalRole::Kesiswaan);
            }
            other => panic!("expected verified, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejection_reasons() {
        let verifier = setup().await;

        assert_eq!(
            verifier.verify("alice", "benar123", "superuser").await.unwrap(),
            VerifyOutcome::Rejected(FailureReason::InvalidRole)
        );
        assert_eq!(
            verifier.verify("nobody", "benar123", "kesiswaan").await.unwrap(),
            VerifyOutcome::Rejected(FailureReason::UserNotFound)
        );
        assert_eq!(
            verifier.verify("alice", "salah", "kesiswaan").await.unwrap(),
            VerifyOutcome::Rejected(FailureReason::InvalidPassword)
        );
    }

    #[tokio::test]
    async fn test_right_password_wrong_role_is_not_found() {
        let verifier = setup().await;
        assert_eq!(
            verifier.verify("alice", "benar123", "admin").await.unwrap(),
            VerifyOutcome::Rejected(FailureReason::UserNotFound)
        );
    }

    #[tokio::test]
    async fn test_role_labels_are_exact() {
        let verifier = setup().await;
        assert_eq!(
            verifier.verify("alice", "benar123", "KESISWAAN").await.unwrap(),
            VerifyOutcome::Rejected(FailureReason::InvalidRole)
        );
    }

    #[tokio::test]
    async fn test_osis_via_student_profile() {
        let verifier = setup().await;
        match verifier.verify("rina", "benar123", "osis").await.unwrap() {
            VerifyOutcome::Verified {
                account,
                requested_role,
            } => {
                assert_eq!(account.role, InternalRole::Siswa);
                assert_eq!(requested_role, InternalRole::Osis);
            }
            other => panic!("expected verified, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_corrupt_stored_hash_is_an_error() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        insert_account(&pool, "broken", InternalRole::Admin, "not-a-phc-string", None, false).await;

        let verifier = CredentialVerifier::new(SqlxAccountRepository::boxed(pool));
        assert!(verifier.verify("broken", "x", "admin").await.is_err());
    }
}
