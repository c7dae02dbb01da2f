//! CaseAI Server (caseai-server) - Main entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use caseai_common::config::load_toml_config;
use caseai_server::providers::DeepgramClient;
use caseai_server::responder::ScriptedResponder;
use caseai_server::{api, AppContext, Config};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for caseai-server
#[derive(Parser, Debug)]
#[command(name = "caseai-server")]
#[command(about = "Conversation delivery service for CaseAI")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "CASEAI_PORT")]
    port: Option<u16>,

    /// Path to the TOML config file
    #[arg(short, long, env = "CASEAI_CONFIG")]
    config: Option<PathBuf>,

    /// Data folder holding the database
    #[arg(short, long, env = "CASEAI_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Deepgram API key; speech endpoints are disabled without one
    #[arg(long, env = "DEEPGRAM_API_KEY", hide_env_values = true)]
    deepgram_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caseai_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Identify the build before anything can fail
    info!(
        "Starting caseai-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let toml_config = load_toml_config(args.config.as_deref()).context("Failed to load config")?;
    let config = Config::resolve(toml_config, args.port, args.root_folder.as_deref())
        .context("Invalid configuration")?;

    info!("Root folder: {}", config.root_folder.display());
    info!("Database: {}", config.db_path.display());

    tokio::fs::create_dir_all(&config.root_folder)
        .await
        .with_context(|| format!("Failed to create {}", config.root_folder.display()))?;

    let db_pool = caseai_common::db::init_database(&config.db_path, &config.database)
        .await
        .context("Failed to initialize database")?;
    info!("Database initialized");

    let deepgram = DeepgramClient::from_config(&config.providers, args.deepgram_api_key)
        .context("Failed to build Deepgram client")?;
    let responder_enabled = config.responder.enabled;
    let addr = config.bind_addr;

    let mut ctx = AppContext::new(db_pool, config);

    match deepgram {
        Some(client) => {
            let client = Arc::new(client);
            ctx = ctx.with_speech(client.clone(), client);
            info!("Speech providers enabled (Deepgram)");
        }
        None => warn!("DEEPGRAM_API_KEY not set; speech endpoints will return 503"),
    }

    if responder_enabled {
        ctx = ctx.with_responder(Arc::new(ScriptedResponder::new()));
        info!("Scripted responder enabled");
    }

    info!("Starting HTTP server on {}", addr);
    api::run(ctx, addr, shutdown_signal()).await
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
