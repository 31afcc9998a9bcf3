//! nut-watcher
//!
//! Main entry point: wires the watch loop and the metrics endpoint together
//! and runs them until SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use nut_watcher::cli::Cli;
use nut_watcher::core::config::{AppConfig, PASSWORD_ENV_VAR};
use nut_watcher::core::utils::format_duration;
use nut_watcher::logging::LoggingSystem;
use nut_watcher::{
    MetricsServer, NutHealthChecker, SystemctlRestarter, Watcher, WatcherError, WatcherMetrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let password = std::env::var(PASSWORD_ENV_VAR).ok();
    let config = cli.into_config(password)?;

    run(config).await.context("nut-watcher stopped")
}

async fn run(config: AppConfig) -> nut_watcher::Result<()> {
    let logging = LoggingSystem::init(config.logging.clone())?;
    tracing::debug!(
        level = %logging.log_level(),
        format = ?logging.log_format(),
        "Logging initialized"
    );

    let metrics = WatcherMetrics::new()?;
    let cancel = CancellationToken::new();

    let mut watcher = Watcher::new(
        config.watcher.clone(),
        Arc::new(NutHealthChecker::new()),
        Arc::new(SystemctlRestarter::new()),
        metrics.clone(),
        cancel.clone(),
    )?;

    tracing::info!(
        nut_server = %config.watcher.server,
        unit = %config.watcher.unit,
        interval = %format_duration(config.watcher.poll_interval),
        metrics = %format!("http://{}/metrics", config.metrics_addr),
        "Watching driver, after {} failures it will be restarted",
        config.watcher.failure_threshold
    );

    // Bind before spawning so a busy port fails startup
    let server = MetricsServer::new(config.metrics_addr, metrics);
    let listener = server.bind().await?;
    let mut server_task = tokio::spawn(server.serve_on(listener, cancel.clone()));
    let watcher_task = tokio::spawn(async move { watcher.run().await });

    let server_result = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut server_task => Some(result),
    };

    tracing::info!("Shutting down");
    cancel.cancel();

    watcher_task.await.map_err(|source| WatcherError::Task {
        task: "watcher",
        source,
    })?;

    let server_result = match server_result {
        Some(result) => result,
        None => server_task.await,
    };
    server_result.map_err(|source| WatcherError::Task {
        task: "metrics server",
        source,
    })??;

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
