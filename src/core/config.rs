//! Configuration module for nut-watcher
//!
//! Handles the resolved runtime configuration:
//! - Which systemd unit to restart and which NUT server to probe
//! - Optional NUT credentials
//! - Failure threshold and poll cadence
//! - Metrics listener and logging settings

use std::net::SocketAddr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use super::error::ConfigError;
use crate::logging::LoggingConfig;

/// systemd unit restarted by default
pub const DEFAULT_UNIT: &str = "nut-driver";

/// NUT server probed by default
pub const DEFAULT_SERVER: &str = "127.0.0.1";

/// Consecutive failures tolerated before a restart
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Time between health checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Listen address of the Prometheus endpoint
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9100";

/// Environment variable carrying the NUT password
pub const PASSWORD_ENV_VAR: &str = "NUT_EXPORTER_PASSWORD";

/// NUT credentials, passed through to the health checker untouched
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    /// Create credentials from a username and password
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    /// Resolve optional credentials.
    ///
    /// No username means no authentication. A username without a non-empty
    /// password is rejected so the watcher never starts with half a login.
    pub fn resolve(
        username: Option<String>,
        password: Option<SecretString>,
    ) -> Result<Option<Self>, ConfigError> {
        let username = match username {
            Some(u) if !u.is_empty() => u,
            _ => return Ok(None),
        };

        match password {
            Some(password) if !password.expose_secret().is_empty() => {
                Ok(Some(Self { username, password }))
            }
            _ => Err(ConfigError::MissingPassword {
                env_var: PASSWORD_ENV_VAR.to_string(),
            }),
        }
    }
}

/// Watcher configuration
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// systemd unit to restart when the driver stops answering
    pub unit: String,

    /// NUT server address, `host` or `host:port`
    pub server: String,

    /// Optional NUT login
    pub credentials: Option<Credentials>,

    /// Consecutive failures that must be exceeded before a restart
    pub failure_threshold: u32,

    /// Time between checks; also the deadline of one restart request
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            unit: DEFAULT_UNIT.to_string(),
            server: DEFAULT_SERVER.to_string(),
            credentials: None,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WatcherConfig {
    /// Set the unit to restart
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Set the NUT server address
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Set the NUT login
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the failure threshold
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Check the invariants the watch loop relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unit.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "unit".to_string(),
                value: self.unit.clone(),
            });
        }

        if self.server.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "server".to_string(),
                value: self.server.clone(),
            });
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "interval".to_string(),
                value: "0s".to_string(),
            });
        }

        if let Some(credentials) = &self.credentials {
            if credentials.username.is_empty() || credentials.password.expose_secret().is_empty()
            {
                return Err(ConfigError::MissingPassword {
                    env_var: PASSWORD_ENV_VAR.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Fully resolved process configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Watch loop settings
    pub watcher: WatcherConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Prometheus endpoint listen address
    pub metrics_addr: SocketAddr,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watcher: WatcherConfig::default(),
            logging: LoggingConfig::default(),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9100)),
        }
    }
}
