//! Logging System for nut-watcher
//!
//! Structured console logs with configurable verbosity. `RUST_LOG`, when
//! set, overrides the configured level.

mod config;


pub use config::{LogFormat, LogLevel, LoggingConfig};

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging system errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationError(String),

    #[error("Invalid log directive: {0}")]
    InvalidDirective(String),
}

/// Result type for logging operations
pub type LoggingResult<T> = Result<T, LoggingError>;

/// Installed logging system
#[derive(Debug)]
pub struct LoggingSystem {
    config: LoggingConfig,
}

impl LoggingSystem {
    /// Initialize the global subscriber with the given configuration
    pub fn init(config: LoggingConfig) -> LoggingResult<Self> {
        let env_filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(&directives)
                .map_err(|e| LoggingError::InvalidDirective(e.to_string()))?,
            _ => Self::build_env_filter(&config)?,
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(Self::create_console_layer(&config))
            .try_init()
            .map_err(|e| LoggingError::InitializationError(e.to_string()))?;

        Ok(Self { config })
    }

    /// Build environment filter from the configured level
    fn build_env_filter(config: &LoggingConfig) -> LoggingResult<EnvFilter> {
        EnvFilter::try_new(config.level.to_string())
            .map_err(|e| LoggingError::InvalidDirective(e.to_string()))
    }

    /// Create console logging layer
    fn create_console_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_thread_ids(config.include_thread_id)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info);

        if config.format == LogFormat::Json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    }

    /// Get current log level
    pub fn log_level(&self) -> LogLevel {
        self.config.level
    }

    /// Get current log format
    pub fn log_format(&self) -> LogFormat {
        self.config.format
    }
}
