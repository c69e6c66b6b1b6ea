//! Tessera Server - Main entry point.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tessera_api::{router, AppState, Validator};
use tessera_identity::CognitoClient;
use tessera_storage::{LocalUserStore, MemoryUserStore};
use tessera_storage_sqlite::SqliteUserStore;
use tessera_users::UserService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "tessera-server")]
#[command(about = "Tessera - user identity service")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/tessera.toml", env = "TESSERA_CONFIG")]
    config: PathBuf,

    /// Enable development mode (in-memory local store)
    #[arg(long, env = "TESSERA_DEV_MODE")]
    dev: bool,

    /// Server bind address, overrides the configuration file
    #[arg(long, env = "TESSERA_BIND_ADDRESS")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    config.apply_env(|name| std::env::var(name).ok());
    config.validate()?;

    let bind = cli.bind.unwrap_or_else(|| config.server.bind.clone());

    tracing::info!("Starting Tessera server...");
    tracing::info!(config = %cli.config.display(), "Configuration loaded");

    let store: Arc<dyn LocalUserStore> = if cli.dev {
        tracing::warn!("Development mode enabled - local users are kept in memory");
        Arc::new(MemoryUserStore::new())
    } else {
        let store = SqliteUserStore::open(&config.database.data_dir, &config.database.name)
            .await
            .context("failed to open local user store")?;
        tracing::info!(path = %store.path().display(), "Local user store opened");
        Arc::new(store)
    };

    let provider = CognitoClient::connect(config.provider())
        .await
        .context("failed to initialise identity provider client")?;

    let users = UserService::new(Arc::new(provider), store);
    let validator = Validator::new(config.password_policy()?);
    let app = router(AppState::new(users, validator), config.request_timeout());

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(address = %bind, "Tessera server started successfully");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
