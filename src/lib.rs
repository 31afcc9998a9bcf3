//! nut-watcher - restarts a stuck NUT driver
//!
//! Some UPS drivers stop talking to their device while the NUT server keeps
//! running and simply reports no devices. This crate provides:
//! - A NUT line-protocol client and health probe
//! - A watch loop that restarts the driver's systemd unit after too many
//!   consecutive failed probes
//! - Prometheus counters for restart attempts and failures
//! - Structured logging and command line configuration

pub mod cli;
pub mod core;
pub mod logging;
pub mod metrics;
pub mod watchdog;

// Re-export commonly used items
pub use core::config::{AppConfig, Credentials, WatcherConfig};
pub use core::error::{Result, WatcherError};
pub use metrics::{MetricsServer, WatcherMetrics};
pub use watchdog::{
    HealthChecker, NutHealthChecker, SystemctlRestarter, TickOutcome, UnitRestarter, Watcher,
};
