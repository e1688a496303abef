//! Tideway - Kafka protocol front end
//!
//! Runs the listener with the standalone group handler.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tideway::config::LogFormat;
use tideway::server::{ServerProbe, StandaloneHandler};
use tideway::{Result, Server, ServerArgs, ServerConfig, TidewayError};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    if let Err(e) = run() {
        eprintln!("Tideway failed to start: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> Result<()> {
    let args = ServerArgs::parse();
    let log_format = args.log_format;

    // RUST_LOG wins over --log-level
    let log_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    match log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(log_filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(log_filter)
            .init(),
    }

    let config = match ServerConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| TidewayError::server("create tokio runtime", e.to_string()))?;

    runtime.block_on(run_server(config))
}

async fn run_server(config: ServerConfig) -> Result<()> {
    if let Some(addr) = config.metrics_addr {
        tideway::metrics::install_exporter(addr)?;
        info!(addr = %addr, "Serving Prometheus metrics");
    }

    let (host, port) = config.advertised_host_port()?;
    let handler = Arc::new(StandaloneHandler::new(config.node_id, host, port));
    let probe = Arc::new(ServerProbe::new());
    let drain_grace = config.shutdown.drain_grace();

    let server = Arc::new(Server::new(config, handler, probe.clone()).await?);
    let listener = server.bind().await?;
    let shutdown = server.shutdown_handle();

    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
    shutdown.shutdown();

    match serving.await {
        Ok(result) => result?,
        Err(e) => warn!(error = %e, "Accept loop task failed"),
    }

    // Connections drain handlers within the grace period, then flush
    let deadline = drain_grace + Duration::from_secs(1);
    if server.wait_for_connections(deadline).await {
        info!("All connections closed");
    } else {
        warn!(
            remaining = server.registry().len(),
            "Connections still open after drain grace"
        );
    }

    let snapshot = probe.snapshot();
    info!(
        connections = snapshot.connections_established,
        requests = snapshot.requests_received,
        protocol_violations = snapshot.protocol_violations,
        "Tideway stopped"
    );
    Ok(())
}
