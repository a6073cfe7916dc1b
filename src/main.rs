use anyhow::{Context, Result};
use bantai_relay::{config::Config, startup};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// bantai-relay: classify chat messages for the BantAI Buddy extension.
#[derive(Debug, Parser)]
#[command(name = "bantai-relay")]
#[command(version)]
struct Args {
    /// TOML config file (server, sampling, notification settings)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Private dotenv file consulted before the process environment for secrets
    #[arg(long)]
    secrets_file: Option<PathBuf>,

    /// Listen address, overrides `server.bind`
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Local development convenience; deployments use real env or --secrets-file.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bantai_relay=info,tower=warn")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let secrets = startup::build_secrets_store(args.secrets_file)?;
    let state = Arc::new(startup::build_state(&config, &secrets)?);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(%addr, "bantai-relay listening");
    axum::serve(listener, bantai_relay::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
