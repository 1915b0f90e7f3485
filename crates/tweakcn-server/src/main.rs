#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tweakcn_core::ChatConfig;
use tweakcn_core::logging::init_tracing;
use tweakcn_server::{AppState, app};

const TRACING_TARGET_STARTUP: &str = "tweakcn_server::startup";
const TRACING_TARGET_SHUTDOWN: &str = "tweakcn_server::shutdown";

#[derive(Debug, Parser)]
#[command(name = "tweakcn-server", version, about = "Serves theme generation and chat sessions")]
struct Cli {
    /// Config file. Defaults to `<config dir>/tweakcn/config.json`.
    #[arg(short, long, env = "TWEAKCN_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `bind_address` from the config.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(target: TRACING_TARGET_SHUTDOWN, "server stopped");
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(target: TRACING_TARGET_SHUTDOWN, error = %error, "server terminated with error");
    } else {
        eprintln!("Error: {error:#}");
    }
    process::exit(1);
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = ChatConfig::load(cli.config.as_deref())
        .await
        .context("failed to load configuration")?;
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }

    tracing::info!(
        target: TRACING_TARGET_STARTUP,
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind_address,
        generation_model = %config.generation_model,
        "starting tweakcn server"
    );

    let state = AppState::from_config(&config)
        .await
        .context("failed to create service state")?;

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(target: TRACING_TARGET_SHUTDOWN, error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!(target: TRACING_TARGET_SHUTDOWN, "shutdown requested");
}
