//! admitq CLI: runs the queue service with its dashboard.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use admitq::config::Config;
use admitq::dashboard::{self, DashboardState};
use admitq::engine::QueueService;
use admitq::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tracing::info;

#[derive(Parser)]
#[command(name = "admitq", about = "Priority work-admission queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the queue service and its dashboard
    Serve {
        /// Dashboard bind address (overrides ADMITQ_HTTP_ADDR)
        #[arg(long)]
        addr: Option<SocketAddr>,
        /// Seconds before a claim counts as abandoned (overrides ADMITQ_STALE_CLAIM_SECS)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        stale_claim_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            addr,
            stale_claim_secs,
        } => cmd_serve(addr, stale_claim_secs).await,
    }
}

async fn cmd_serve(addr: Option<SocketAddr>, stale_claim_secs: Option<u64>) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;
    if let Some(addr) = addr {
        config.dashboard.bind_addr = addr;
    }
    if let Some(secs) = stale_claim_secs {
        config.queue.stale_claim_timeout = Duration::from_secs(secs);
    }

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "admitq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    info!(
        stale_claim_secs = config.queue.stale_claim_timeout.as_secs(),
        reap_interval_secs = config.queue.reap_interval.as_secs(),
        admission_window_secs = config.queue.admission_window.as_secs(),
        "starting admitq v{}",
        env!("CARGO_PKG_VERSION")
    );

    let service = QueueService::new(config.queue.clone());
    let reaper = service.start_reaper();

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("ctrl-c received, shutting down");
        signal.notify_one();
    });

    let listener = tokio::net::TcpListener::bind(config.dashboard.bind_addr).await?;
    let state = DashboardState::new(service.clone(), &config.dashboard);
    dashboard::serve(listener, state, async move { shutdown.notified().await }).await?;

    reaper.stop().await;
    info!(remaining = service.len(), "admitq stopped");
    Ok(())
}
