//! Error types for nut-watcher
//!
//! Per-tick failures (`HealthCheckError`, `RestartError`) are absorbed by the
//! watch loop. Only `WatcherError` reaches `main`.

use std::time::Duration;

use thiserror::Error;

use crate::watchdog::nut::NutError;

/// Result type alias for nut-watcher operations
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that stop the process
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    #[error("{task} task failed: {source}")]
    Task {
        task: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Configuration errors, all fatal at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {value} (expected trace, debug, info, warn, error, fatal)")]
    InvalidLogLevel { value: String },

    #[error("Invalid log format: {value} (expected text or json)")]
    InvalidLogFormat { value: String },

    #[error("Invalid duration: {value}: {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("Invalid config value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("username set but {env_var} is not set or is empty")]
    MissingPassword { env_var: String },
}

/// Failures of a single health check
///
/// The watcher treats every variant the same way: one more consecutive failure.
#[derive(Error, Debug)]
pub enum HealthCheckError {
    #[error("failed to connect to NUT server {server}: {source}")]
    Connect {
        server: String,
        #[source]
        source: NutError,
    },

    #[error("failed to authenticate to NUT server as {username}: {source}")]
    Authenticate {
        username: String,
        #[source]
        source: NutError,
    },

    #[error("failed to list UPS devices: {source}")]
    ListDevices {
        #[source]
        source: NutError,
    },

    #[error("driver returned no devices")]
    NoDevices,

    #[error("health check timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("health check cancelled")]
    Cancelled,
}

/// Failures of a single restart request
#[derive(Error, Debug)]
pub enum RestartError {
    #[error("failed to reach process supervisor: {reason}")]
    SupervisorUnavailable { reason: String },

    #[error("supervisor rejected restart of {unit}: {reason}")]
    Rejected { unit: String, reason: String },

    #[error("restart of {unit} did not complete within {timeout:?}")]
    DeadlineExceeded { unit: String, timeout: Duration },

    #[error("restart of {unit} cancelled")]
    Cancelled { unit: String },
}

impl RestartError {
    /// Whether the request ran out of time rather than being refused
    pub fn is_timeout(&self) -> bool {
        matches!(self, RestartError::DeadlineExceeded { .. })
    }
}

/// Metrics registry and endpoint errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registry(#[from] prometheus::Error),

    #[error("failed to bind metrics listener on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failure serving metrics: {0}")]
    Serve(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_converts_to_root() {
        let err: WatcherError = ConfigError::MissingPassword {
            env_var: "NUT_EXPORTER_PASSWORD".to_string(),
        }
        .into();
        assert!(matches!(err, WatcherError::Config(_)));
        assert!(err.to_string().contains("NUT_EXPORTER_PASSWORD"));
    }

    #[test]
    fn test_bind_error_keeps_source() {
        use std::error::Error as _;

        let err: WatcherError = MetricsError::Bind {
            addr: "127.0.0.1:9100".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        }
        .into();
        assert!(err.to_string().contains("127.0.0.1:9100"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_restart_timeout_classification() {
        let timeout = RestartError::DeadlineExceeded {
            unit: "nut-driver".to_string(),
            timeout: Duration::from_secs(10),
        };
        assert!(timeout.is_timeout());

        let rejected = RestartError::Rejected {
            unit: "nut-driver".to_string(),
            reason: "Unit nut-driver.service not found.".to_string(),
        };
        assert!(!rejected.is_timeout());
    }
}
