use anyhow::Context;
use dotenvy::dotenv;
use rollcall_server::{AppConfig, AppState, axum_app, db};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env()?;
    info!("Starting rollcall with {:?}", config);

    let db = db::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;

    let expired = db::token_ops::cleanup_expired_tokens(&db).await?;
    if expired > 0 {
        info!("Removed {} expired sessions", expired);
    }

    let state = Arc::new(AppState::new(db, &config.auth));
    let app = axum_app(state);

    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
