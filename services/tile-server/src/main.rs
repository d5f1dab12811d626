//! Mandelbrot tile server.
//!
//! Renders tiles directly, or composites them from leaf sub-tiles served by
//! downstream tile servers when `--tile-servers` is set.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tile_server::config::{Args, TileServerConfig};
use tile_server::server;
use tile_server::state::AppState;

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = TileServerConfig::from_args(&args)?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    info!(
        ports = config.num_ports,
        port_base = config.port_base,
        tile_servers = ?config.tile_servers,
        leaf_tile_size = config.leaf_tile_size,
        oversample = config.oversample,
        max_iterations = config.max_iterations,
        worker_threads = ?args.worker_threads,
        "Starting tile server"
    );

    let state = Arc::new(AppState::new(&config)?);
    let app = server::build_router(state.clone(), Some(prometheus_handle));

    let listeners = server::bind_all(&config).await?;
    server::spawn_signal_handler(state.shutdown.clone());
    server::serve_all(listeners, app, state.shutdown.clone()).await
}
