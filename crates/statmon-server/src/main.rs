use anyhow::Result;
use statmon_server::config::ServerConfig;
use statmon_server::{app, state::AppState};
use statmon_storage::open_storage;
use std::path::Path;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("statmon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = ServerConfig::load(&config_path)?;

    tracing::info!(
        addr = %config.listen_addr,
        backend = if config.store.database_dsn.is_some() { "relational" } else { "memory" },
        "statmon-server starting"
    );

    let storage = open_storage(&config.store).await?;

    if config.store.restore {
        if let Some(file) = &config.store.file {
            storage.restore_from_file(Path::new(file)).await?;
        }
    }

    let state = AppState::from_config(&config, storage.clone())?;
    let app = app::build_http_app(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Flush the tail window of interval persistence before exiting.
    if let Err(e) = storage.save().await {
        tracing::error!(error = %e, "final snapshot flush failed");
    }
    storage.close().await?;
    tracing::info!("server stopped");

    Ok(())
}
