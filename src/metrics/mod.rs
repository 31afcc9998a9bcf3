//! Restart counters exposed for Prometheus scraping
//!
//! `WatcherMetrics` owns its own `Registry` so tests can create as many
//! instances as they like without clashing on global registration.

mod server;

pub use server::{MetricsServer, SHUTDOWN_TIMEOUT};

use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

use crate::core::error::MetricsError;

/// Name of the restart attempts counter
pub const RESTARTS_TOTAL: &str = "nut_watcher_driver_restarts_total";

/// Name of the failed restarts counter
pub const RESTART_ERRORS_TOTAL: &str = "nut_watcher_driver_restart_errors_total";

/// Monotone restart counters
#[derive(Clone)]
pub struct WatcherMetrics {
    registry: Registry,
    restarts_total: IntCounter,
    restart_errors_total: IntCounter,
}

impl WatcherMetrics {
    /// Create the counters and register them in a fresh registry
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let restarts_total = IntCounter::with_opts(Opts::new(
            RESTARTS_TOTAL,
            "Number of times the watcher asked the supervisor to restart the driver",
        ))?;
        let restart_errors_total = IntCounter::with_opts(Opts::new(
            RESTART_ERRORS_TOTAL,
            "Number of driver restart requests that failed",
        ))?;

        registry.register(Box::new(restarts_total.clone()))?;
        registry.register(Box::new(restart_errors_total.clone()))?;

        Ok(Self {
            registry,
            restarts_total,
            restart_errors_total,
        })
    }

    /// Count one restart attempt
    pub fn record_restart_attempt(&self) {
        self.restarts_total.inc();
    }

    /// Count one failed restart attempt
    pub fn record_restart_error(&self) {
        self.restart_errors_total.inc();
    }

    pub fn restarts_total(&self) -> u64 {
        self.restarts_total.get()
    }

    pub fn restart_errors_total(&self) -> u64 {
        self.restart_errors_total.get()
    }

    /// Get the underlying registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl std::fmt::Debug for WatcherMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherMetrics")
            .field("restarts_total", &self.restarts_total())
            .field("restart_errors_total", &self.restart_errors_total())
            .finish()
    }
}
