use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use floodgate::config::{ConfigOverrides, FloodgateConfig};
use floodgate::flood::FloodControl;
use floodgate::http::HttpServer;

/// Per-identity flood control in front of an HTTP endpoint.
#[derive(Parser, Debug)]
#[command(name = "floodgate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides configuration)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Maximum calls per identity within the window (overrides configuration)
    #[arg(long)]
    limit: Option<usize>,

    /// Window width in milliseconds (overrides configuration)
    #[arg(long)]
    period_ms: Option<u64>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    info!("Starting Floodgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let overrides = ConfigOverrides {
        http_addr: cli.listen,
        limit: cli.limit,
        period_ms: cli.period_ms,
    };
    let config = FloodgateConfig::load(cli.config.as_deref(), &overrides)?;
    info!(
        http_addr = %config.server.http_addr,
        limit = config.flood_control.limit,
        period_ms = config.flood_control.period_ms,
        "Configuration loaded"
    );

    let gate = Arc::new(FloodControl::<i64>::from_config(&config.flood_control)?);
    info!("Flood control initialized");

    let sweeper = spawn_sweeper(Arc::clone(&gate), config.flood_control.sweep_interval());

    let server = HttpServer::new(config.server.http_addr, gate);
    let result = server.serve_with_shutdown(shutdown_signal()).await;

    sweeper.abort();
    result?;

    info!("Floodgate stopped");
    Ok(())
}

fn init_tracing(cli: &Cli) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(true);

    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Periodically drop identities that have no calls left in their window.
fn spawn_sweeper(gate: Arc<FloodControl<i64>>, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let evicted = gate.evict_idle();
            debug!(
                evicted = evicted,
                tracked = gate.tracked_identities(),
                "Idle identity sweep finished"
            );
        }
    })
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
