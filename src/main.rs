use clap::Parser;
use rads_agent::config;
use rads_agent::store::Store;
use rads_agent::supervisor;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rads-agent", version)]
struct Cli {
    /// Path to the agent's YAML configuration file.
    #[arg(long, env = "RADS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting rads-agent");

    let cli = Cli::parse();
    let agent_config = match cli.config {
        Some(path) => config::load_config_from_path(&path)?,
        None => config::load_config()?,
    };
    info!(agent_id = %agent_config.agent_id, "configuration loaded");

    let store = Store::open(std::path::Path::new(&agent_config.database_file_path))?;
    info!("local store opened");

    let token = CancellationToken::new();
    let shutdown_token = token.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        shutdown_token.cancel();
    });

    supervisor::run(agent_config, store, token).await;
    info!("rads-agent stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
