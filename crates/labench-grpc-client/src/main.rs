#![doc = include_str!("../README.md")]

mod client;

use clap::Parser;
use client::config::{CliArgs, RunConfig};
use client::driver;
use client::telemetry::init_telemetry;
use labench_grpc_core::{GrpcRequesterFactory, TonicConnector};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = RunConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let connector = TonicConnector::new().with_connect_timeout(config.connect_timeout);
    let factory = Arc::new(GrpcRequesterFactory::with_connector(
        config.factory.clone(),
        connector,
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let result = driver::run(factory, config.clients, config.requests, shutdown).await;
    providers.shutdown();

    let summary = result?;
    summary.report();

    #[cfg(feature = "tracing")]
    tracing::info!("Run finished");
    Ok(())
}

fn log_startup_info(_config: &RunConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting run with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Calling {} on {} with {} clients x {} requests",
            _config.factory.call,
            _config.factory.target,
            _config.clients,
            _config.requests
        );
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(_e) = signal::ctrl_c().await {
        #[cfg(feature = "tracing")]
        tracing::error!("Failed to install Ctrl+C handler: {:?}", _e);
        return;
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Received Ctrl+C signal, stopping workers...");

    shutdown.cancel();
}
