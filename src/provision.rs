//! Startup provisioning of the administrator account.

use tracing::{info, instrument};

use crate::auth::password::Passwords;
use crate::config::AdminSeed;
use crate::users::repo::{RepoError, UserRepository};
use crate::users::repo_types::NewUser;

/// Inserts the administrator from `seed` unless the username already exists.
/// An existing row is left untouched, whatever its role or password.
/// Returns `true` when a row was inserted.
#[instrument(skip(repo, passwords, seed), fields(username = %seed.username))]
pub async fn ensure_admin(
    repo: &dyn UserRepository,
    passwords: &Passwords,
    seed: &AdminSeed,
) -> anyhow::Result<bool> {
    if repo.find_by_username(&seed.username).await?.is_some() {
        info!("administrator already present");
        return Ok(false);
    }

    let password_hash = passwords.hash(seed.password.clone()).await?;
    let new_admin = NewUser {
        username: seed.username.clone(),
        password_hash,
        first_name: seed.first_name.clone(),
        last_name: seed.last_name.clone(),
        gender: seed.gender,
        birthdate: seed.birthdate,
        is_admin: true,
    };

    match repo.create(new_admin).await {
        Ok(user) => {
            info!(user_id = user.id, "administrator created");
            Ok(true)
        }
        // another instance won the race
        Err(RepoError::DuplicateUsername) => {
            info!("administrator already present");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use crate::users::memory::MemoryUserRepository;

    #[tokio::test]
    async fn creates_admin_once() {
        let repo = MemoryUserRepository::default();
        let passwords = Passwords::fast();
        let seed = AppState::fake().config.admin.clone();

        assert!(ensure_admin(&repo, &passwords, &seed).await.unwrap());
        assert!(!ensure_admin(&repo, &passwords, &seed).await.unwrap());
        assert_eq!(repo.len(), 1);

        let admin = repo.find_by_username("admin").await.unwrap().unwrap();
        assert!(admin.is_admin);
        assert_eq!(admin.first_name, "Admin");
        assert!(passwords
            .verify("admin123".into(), admin.password_hash)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn existing_row_is_left_alone() {
        let repo = MemoryUserRepository::default();
        let existing = repo.insert_admin("admin");
        let seed = AppState::fake().config.admin.clone();

        assert!(!ensure_admin(&repo, &Passwords::fast(), &seed).await.unwrap());
        let row = repo.get(existing.id).unwrap();
        assert_eq!(row.password_hash, "not-a-hash");
    }
}
