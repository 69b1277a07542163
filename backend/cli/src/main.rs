mod status_cmd;
mod terminal_output;
mod wiring;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use verilink_config::{config_dir, config_file_path, load_and_prepare, load_config, redacted_snapshot};
use verilink_flows::FlowOrchestrator;
use verilink_gateway::{router, start_server, GatewayState};
use verilink_logging::init_logger;

/// How often expired sessions are swept.
const EVICTION_INTERVAL_SECS: u64 = 30;

#[derive(Parser)]
#[command(name = "verilink")]
#[command(about = "verilink: remote identity verification session server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
        /// Config file (defaults to $VERILINK_CONFIG_DIR/config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show the status of a running server
    Status {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_path = config_file_path(&config_dir());

    match cli.command {
        Commands::Serve { port, config } => {
            run_server(port, config.unwrap_or(default_path)).await?;
        }
        Commands::Status { port } => {
            let port = match port {
                Some(port) => port,
                None => load_config(&default_path).await?.port(),
            };
            status_cmd::run(port).await?;
        }
    }

    Ok(())
}

async fn run_server(port: Option<u16>, config_path: PathBuf) -> Result<()> {
    let config = load_and_prepare(&config_path).await?;
    init_logger(config.log_dir(), &config.log_level())?;
    let snapshot = redacted_snapshot(&config)?;
    debug!(config = %snapshot, "Effective configuration");

    let orchestrator = Arc::new(wiring::build_orchestrator(&config)?);
    let shutdown = CancellationToken::new();
    spawn_eviction(Arc::clone(&orchestrator), config.session_ttl(), shutdown.clone());

    let app = router(GatewayState::new(Arc::clone(&orchestrator)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.bind_address(), port.unwrap_or(config.port()))
        .parse()
        .context("Invalid bind address")?;
    info!(
        addr = %addr,
        config = %config_path.display(),
        "Starting verilink"
    );

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        signal.cancel();
    });

    let served = start_server(addr, app, shutdown.clone().cancelled_owned()).await;
    shutdown.cancel();
    orchestrator.shutdown().await;
    info!("verilink stopped");
    served
}

/// Periodically cancel sessions older than `ttl`.
fn spawn_eviction(orchestrator: Arc<FlowOrchestrator>, ttl: Duration, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(EVICTION_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    orchestrator.evict_expired(ttl).await;
                }
            }
        }
    });
}
