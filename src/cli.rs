//! Command line interface
//!
//! Flags mirror the NUT exporter's so both can share one unit file. The
//! password is never a flag; it only comes from `NUT_EXPORTER_PASSWORD`.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use secrecy::SecretString;

use crate::core::config::{
    AppConfig, Credentials, WatcherConfig, DEFAULT_FAILURE_THRESHOLD, DEFAULT_METRICS_ADDR,
    DEFAULT_SERVER, DEFAULT_UNIT,
};
use crate::core::error::ConfigError;
use crate::core::utils::parse_duration;
use crate::logging::{LogFormat, LogLevel, LoggingConfig};

/// Restarts a stuck NUT driver
#[derive(Debug, Parser)]
#[command(name = "nut-watcher")]
#[command(about = "Restart a NUT driver when its server stops listing devices", long_about = None)]
#[command(version)]
pub struct Cli {
    /// systemd unit to restart
    #[arg(long, default_value = DEFAULT_UNIT)]
    pub unit: String,

    /// NUT server address, host or host:port
    #[arg(short, long, default_value = DEFAULT_SERVER)]
    pub server: String,

    /// NUT username; the password is read from NUT_EXPORTER_PASSWORD
    #[arg(long)]
    pub username: Option<String>,

    /// Consecutive failed checks tolerated before a restart
    #[arg(short = 'f', long, default_value_t = DEFAULT_FAILURE_THRESHOLD)]
    pub failure_threshold: u32,

    /// Time between checks, e.g. 10s or 1m30s
    #[arg(long, default_value = "10s", value_parser = parse_interval)]
    pub interval: Duration,

    /// Listen address of the metrics endpoint
    #[arg(long, default_value = DEFAULT_METRICS_ADDR)]
    pub metrics_addr: SocketAddr,

    /// Log verbosity: trace, debug, info, warn, error
    #[arg(short, long, default_value = "info")]
    pub verbosity: String,

    /// Log output format: text or json
    #[arg(long, default_value = "text")]
    pub log_format: String,

    /// Include thread IDs in log lines
    #[arg(long)]
    pub log_thread_ids: bool,

    /// Include source file and line in log lines
    #[arg(long)]
    pub log_file_info: bool,
}

fn parse_interval(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

impl Cli {
    /// Resolve flags and the password into a validated configuration
    pub fn into_config(self, password: Option<String>) -> Result<AppConfig, ConfigError> {
        let level: LogLevel = self.verbosity.parse()?;
        let format: LogFormat = self.log_format.parse()?;

        let credentials = Credentials::resolve(self.username, password.map(SecretString::new))?;

        let mut watcher = WatcherConfig::default()
            .with_unit(self.unit)
            .with_server(self.server)
            .with_failure_threshold(self.failure_threshold)
            .with_poll_interval(self.interval);
        watcher.credentials = credentials;
        watcher.validate()?;

        Ok(AppConfig {
            watcher,
            logging: LoggingConfig::new()
                .with_level(level)
                .with_format(format)
                .with_thread_id(self.log_thread_ids)
                .with_file_info(self.log_file_info),
            metrics_addr: self.metrics_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["nut-watcher"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).into_config(None).unwrap();
        assert_eq!(config.watcher.unit, "nut-driver");
        assert_eq!(config.watcher.server, "127.0.0.1");
        assert_eq!(config.watcher.failure_threshold, 3);
        assert_eq!(config.watcher.poll_interval, Duration::from_secs(10));
        assert!(config.watcher.credentials.is_none());
        assert_eq!(config.metrics_addr, "0.0.0.0:9100".parse().unwrap());
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(!config.logging.include_thread_id);
        assert!(!config.logging.include_file_info);
    }

    #[test]
    fn test_log_detail_flags() {
        let config = parse(&["--log-thread-ids", "--log-file-info"])
            .into_config(None)
            .unwrap();
        assert!(config.logging.include_thread_id);
        assert!(config.logging.include_file_info);
    }

    #[test]
    fn test_all_flags() {
        let cli = parse(&[
            "--unit",
            "nut-driver@ups1",
            "-s",
            "10.0.0.5:3493",
            "--username",
            "monuser",
            "-f",
            "5",
            "--interval",
            "1m30s",
            "--metrics-addr",
            "127.0.0.1:9199",
            "-v",
            "debug",
            "--log-format",
            "json",
        ]);
        let config = cli.into_config(Some("secret".to_string())).unwrap();

        assert_eq!(config.watcher.unit, "nut-driver@ups1");
        assert_eq!(config.watcher.server, "10.0.0.5:3493");
        assert_eq!(config.watcher.failure_threshold, 5);
        assert_eq!(config.watcher.poll_interval, Duration::from_secs(90));
        assert_eq!(config.metrics_addr, "127.0.0.1:9199".parse().unwrap());
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);

        let credentials = config.watcher.credentials.unwrap();
        assert_eq!(credentials.username, "monuser");
        assert_eq!(credentials.password.expose_secret(), "secret");
    }

    #[test]
    fn test_username_without_password() {
        let err = parse(&["--username", "monuser"])
            .into_config(None)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "username set but NUT_EXPORTER_PASSWORD is not set or is empty"
        );

        let err = parse(&["--username", "monuser"])
            .into_config(Some(String::new()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingPassword { .. }));
    }

    #[test]
    fn test_password_without_username_is_ignored() {
        let config = parse(&[]).into_config(Some("secret".to_string())).unwrap();
        assert!(config.watcher.credentials.is_none());
    }

    #[test]
    fn test_fatal_verbosity_maps_to_error() {
        let config = parse(&["-v", "fatal"]).into_config(None).unwrap();
        assert_eq!(config.logging.level, LogLevel::Error);
    }

    #[test]
    fn test_invalid_verbosity() {
        let err = parse(&["-v", "loud"]).into_config(None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogLevel { .. }));
    }

    #[test]
    fn test_invalid_interval_rejected_by_parser() {
        let argv = ["nut-watcher", "--interval", "ten"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = parse(&["--interval", "0s"]).into_config(None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "interval"));
    }

    #[test]
    fn test_negative_threshold_rejected_by_parser() {
        let argv = ["nut-watcher", "-f", "-1"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_clap_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
