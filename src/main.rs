use std::sync::Arc;

mod app;
mod auth;
mod config;
mod db;
mod error;
mod provision;
mod state;
mod users;

use crate::auth::password::Passwords;
use crate::config::AppConfig;
use crate::state::AppState;
use crate::users::repo::{PgUserRepository, UserRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "user_admin=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = Arc::new(AppConfig::from_env()?);
    let db = db::connect(&config).await?;
    db::migrate(&db).await?;

    let repo: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(db));
    let passwords = Passwords::default();
    provision::ensure_admin(repo.as_ref(), &passwords, &config.admin).await?;

    let state = AppState::new(config, repo, passwords);
    app::serve(app::build_app(state)).await
}
