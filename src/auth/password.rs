use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

/// Salted argon2 hashing. Work runs on the blocking pool.
#[derive(Clone)]
pub struct Passwords {
    params: Params,
}

impl Default for Passwords {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl Passwords {
    /// Cheapest parameters argon2 accepts; for tests only.
    #[cfg(test)]
    pub fn fast() -> Self {
        let params = Params::new(Params::MIN_M_COST, Params::MIN_T_COST, 1, None)
            .expect("minimum argon2 params are valid");
        Self { params }
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub async fn hash(&self, plain: String) -> anyhow::Result<String> {
        let argon2 = self.hasher();
        tokio::task::spawn_blocking(move || hash_with(&argon2, &plain)).await?
    }

    /// `false` for a wrong password or a malformed stored hash.
    pub async fn verify(&self, plain: String, hash: String) -> anyhow::Result<bool> {
        let ok = tokio::task::spawn_blocking(move || verify_password(&plain, &hash)).await?;
        Ok(ok)
    }
}

fn hash_with(argon2: &Argon2<'_>, plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    hash_with(&Argon2::default(), plain)
}

/// Parameters come from the PHC string, not from `Passwords`.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "argon2 parse hash error");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}
