mod app;
mod auth;
mod causes;
mod config;
mod db;
mod error;
mod media;
mod products;
mod state;
mod store;
mod timestamp;
mod users;
mod validate;

use crate::{app::build_app, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "guiver=debug,axum=info,tower_http=info".to_string());
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

    let config = AppConfig::from_env()?;
    let state = AppState::init(config).await?;

    let _identity_log = state.identity.on_identity_change(|change| {
        tracing::info!(
            user_id = %change.identity.id,
            email_verified = change.identity.email_verified,
            reason = ?change.reason,
            "identity changed"
        );
    });

    let config = state.config.clone();
    app::serve(build_app(state), &config).await
}
