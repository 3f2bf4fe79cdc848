use std::sync::Arc;

use lazy_static::lazy_static;
use tracing::{debug, instrument};

use super::password::{hash_password, Passwords};
use crate::users::repo::UserRepository;

lazy_static! {
    // Verified against when the username is unknown so both failures cost the same.
    static ref DUMMY_HASH: String = hash_password("not-a-real-password").unwrap_or_default();
}

/// Who a set of credentials belongs to. Whether they may sign in is the caller's call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct CredentialVerifier {
    repo: Arc<dyn UserRepository>,
    passwords: Passwords,
}

impl CredentialVerifier {
    pub fn new(repo: Arc<dyn UserRepository>, passwords: Passwords) -> Self {
        Self { repo, passwords }
    }

    /// `None` for an unknown username and for a wrong password alike.
    #[instrument(skip(self, password))]
    pub async fn verify(&self, username: &str, password: &str) -> anyhow::Result<Option<Identity>> {
        let user = self.repo.find_by_username(username).await?;

        let Some(user) = user else {
            let _ = self
                .passwords
                .verify(password.to_string(), DUMMY_HASH.clone())
                .await?;
            debug!("unknown username");
            return Ok(None);
        };

        if !self
            .passwords
            .verify(password.to_string(), user.password_hash.clone())
            .await?
        {
            debug!(user_id = user.id, "password mismatch");
            return Ok(None);
        }

        Ok(Some(Identity {
            id: user.id,
            username: user.username,
            is_admin: user.is_admin,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::memory::MemoryUserRepository;
    use crate::users::repo_types::{Gender, NewUser};
    use time::macros::date;

    async fn seeded() -> (CredentialVerifier, i64, i64) {
        let repo = Arc::new(MemoryUserRepository::default());
        let passwords = Passwords::fast();
        let mut ids = Vec::new();
        for (username, is_admin) in [("admin", true), ("alice01", false)] {
            let user = repo.insert_raw(NewUser {
                username: username.into(),
                password_hash: passwords.hash("Secret1".into()).await.unwrap(),
                first_name: "First".into(),
                last_name: "Last".into(),
                gender: Gender::Female,
                birthdate: date!(1990 - 05 - 01),
                is_admin,
            });
            ids.push(user.id);
        }
        (CredentialVerifier::new(repo, passwords), ids[0], ids[1])
    }

    #[tokio::test]
    async fn correct_credentials_yield_identity() {
        let (verifier, admin_id, alice_id) = seeded().await;

        let admin = verifier.verify("admin", "Secret1").await.unwrap().unwrap();
        assert_eq!(admin.id, admin_id);
        assert!(admin.is_admin);

        let alice = verifier.verify("alice01", "Secret1").await.unwrap().unwrap();
        assert_eq!(alice.id, alice_id);
        assert!(!alice.is_admin);
    }

    #[tokio::test]
    async fn failures_are_indistinguishable() {
        let (verifier, _, _) = seeded().await;
        assert_eq!(verifier.verify("admin", "wrong-pass").await.unwrap(), None);
        assert_eq!(verifier.verify("nobody", "Secret1").await.unwrap(), None);
        // lookup is exact and case-sensitive
        assert_eq!(verifier.verify("ADMIN", "Secret1").await.unwrap(), None);
    }
}
