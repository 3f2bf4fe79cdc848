use anyhow::Context;
use time::{macros::date, Date};

use crate::users::repo_types::Gender;
use crate::users::validation::parse_iso_date;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Administrator account inserted on startup when missing.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: Gender,
    pub birthdate: Date,
}

#[derive(Debug, Clone)]
pub struct LoginLimitConfig {
    pub max_attempts: usize,
    pub window_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub page_size: i64,
    pub admin: AdminSeed,
    pub login_limit: LoginLimitConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: env_or("JWT_ISSUER", "user-admin"),
            audience: env_or("JWT_AUDIENCE", "user-admin-panel"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60),
        };
        let login_limit = LoginLimitConfig {
            max_attempts: env_parse("LOGIN_MAX_ATTEMPTS", 5),
            window_seconds: env_parse("LOGIN_WINDOW_SECONDS", 15 * 60),
        };

        Ok(Self {
            database_url,
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
            jwt,
            page_size: env_parse::<i64>("USERS_PAGE_SIZE", 10).max(1),
            admin: AdminSeed::from_env(),
            login_limit,
        })
    }
}

impl AdminSeed {
    const DEFAULT_BIRTHDATE: Date = date!(1990 - 01 - 01);

    pub fn from_env() -> Self {
        let gender = match env_or("ADMIN_GENDER", "male").to_lowercase().as_str() {
            "female" => Gender::Female,
            _ => Gender::Male,
        };

        let raw_birthdate = env_or("ADMIN_BIRTHDATE", "1990-01-01");
        let birthdate = parse_iso_date(raw_birthdate.trim()).unwrap_or_else(|| {
            tracing::warn!(
                value = %raw_birthdate,
                "invalid ADMIN_BIRTHDATE, falling back to 1990-01-01"
            );
            Self::DEFAULT_BIRTHDATE
        });

        Self {
            username: env_or("ADMIN_USERNAME", "admin"),
            password: env_or("ADMIN_PASSWORD", "admin123"),
            first_name: env_or("ADMIN_FIRST_NAME", "Admin"),
            last_name: env_or("ADMIN_LAST_NAME", "User"),
            gender,
            birthdate,
        }
    }
}
