use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chronoqueue::api::{self, ApiState};
use chronoqueue::config::EngineConfig;
use chronoqueue::engine::Engine;
use chronoqueue::queue::MemoryQueue;
use chronoqueue::shutdown::install_shutdown_handler;
use chronoqueue::store::MemoryStore;
use chronoqueue::worker::SimulatedExecutor;

#[derive(Parser, Debug)]
#[command(name = "chronoqueue")]
#[command(version)]
#[command(about = "Durable at-least-once job scheduling and execution engine")]
struct Args {
    /// Port for the HTTP submission API
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Number of worker instances
    #[arg(long, default_value = "2")]
    workers: usize,

    /// Lease duration in seconds
    #[arg(long, default_value = "30")]
    lease_secs: u64,

    /// Simulated task duration in milliseconds
    #[arg(long, default_value = "1000")]
    task_duration_ms: u64,

    /// Simulated task success rate (0.0 - 1.0)
    #[arg(long, default_value = "0.6")]
    success_rate: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = EngineConfig {
        worker_count: args.workers,
        lease_duration_secs: args.lease_secs,
        ..EngineConfig::default()
    };

    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let executor = Arc::new(SimulatedExecutor::new(
        Duration::from_millis(args.task_duration_ms),
        args.success_rate,
    ));

    let engine = Engine::new(config, store, queue, executor);

    let shutdown = install_shutdown_handler();
    engine.start(shutdown.clone()).await?;

    let state = ApiState {
        store: engine.store(),
        attempts: engine.attempts(),
    };
    let app = api::router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    tracing::info!(addr = %addr, workers = args.workers, "Starting chronoqueue");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
