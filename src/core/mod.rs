//! nut-watcher Core Module
//!
//! This module contains the shared building blocks:
//! - Configuration management
//! - Error types
//! - Duration parsing helpers

pub mod config;
pub mod error;
pub mod utils;

// Re-export commonly used items
pub use config::*;
pub use error::{
    ConfigError, HealthCheckError, MetricsError, RestartError, Result, WatcherError,
};
