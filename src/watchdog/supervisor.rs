//! Watcher Supervisor Module
//!
//! Polls the driver on a fixed cadence and asks the supervisor for a restart
//! once the driver has failed more than `failure_threshold` checks in a row.

use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::health::HealthChecker;
use super::restart::UnitRestarter;
use crate::core::config::WatcherConfig;
use crate::core::error::{ConfigError, HealthCheckError, RestartError};
use crate::metrics::WatcherMetrics;

/// Watcher state, derived from the failure counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Last check succeeded, or a restart was just attempted
    Healthy,
    /// Failing, but not yet past the threshold
    Degrading,
}

/// What one tick of the loop did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Check passed; counter reset
    Healthy,
    /// Check failed; counter now at `failures`
    Degraded { failures: u32 },
    /// Threshold exceeded and the supervisor accepted the restart
    Restarted,
    /// Threshold exceeded and the restart request failed
    RestartFailed,
    /// Cancellation fired mid-tick
    Cancelled,
}

/// Driver watchdog
pub struct Watcher {
    config: WatcherConfig,
    checker: Arc<dyn HealthChecker>,
    restarter: Arc<dyn UnitRestarter>,
    metrics: WatcherMetrics,
    cancel: CancellationToken,
    consecutive_failures: u32,
}

impl Watcher {
    /// Create a watcher; fails if the configuration is incomplete
    pub fn new(
        config: WatcherConfig,
        checker: Arc<dyn HealthChecker>,
        restarter: Arc<dyn UnitRestarter>,
        metrics: WatcherMetrics,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            config,
            checker,
            restarter,
            metrics,
            cancel,
            consecutive_failures: 0,
        })
    }

    /// Get current watcher state
    pub fn state(&self) -> WatcherState {
        if self.consecutive_failures == 0 {
            WatcherState::Healthy
        } else {
            WatcherState::Degrading
        }
    }

    /// Failed checks since the last success or restart attempt
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn metrics(&self) -> &WatcherMetrics {
        &self.metrics
    }

    /// Run the watch loop until the cancellation token fires.
    ///
    /// The first check happens one interval after start. Ticks never overlap:
    /// a slow check pushes the next tick back instead.
    pub async fn run(&mut self) {
        let span = tracing::info_span!(
            "watcher",
            unit = %self.config.unit,
            server = %self.config.server
        );
        self.watch().instrument(span).await
    }

    async fn watch(&mut self) {
        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.tick().await == TickOutcome::Cancelled {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Watcher stopped");
    }

    /// Run one health check and apply the threshold policy
    pub async fn tick(&mut self) -> TickOutcome {
        let err = match self.check_health().await {
            Ok(()) => {
                if self.consecutive_failures > 0 {
                    tracing::info!(
                        previous_failures = self.consecutive_failures,
                        "UPS driver recovered"
                    );
                }
                self.consecutive_failures = 0;
                return TickOutcome::Healthy;
            }
            Err(HealthCheckError::Cancelled) => return TickOutcome::Cancelled,
            Err(e) => e,
        };

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        tracing::warn!(
            error = %err,
            count = self.consecutive_failures,
            threshold = self.config.failure_threshold,
            "UPS seems dead"
        );

        if self.consecutive_failures <= self.config.failure_threshold {
            return TickOutcome::Degraded {
                failures: self.consecutive_failures,
            };
        }

        let result = self.restart_unit().await;
        // Reset even on failure: the next request waits for a fresh run of failures
        self.consecutive_failures = 0;

        match result {
            Ok(()) => TickOutcome::Restarted,
            Err(RestartError::Cancelled { .. }) => TickOutcome::Cancelled,
            Err(_) => TickOutcome::RestartFailed,
        }
    }

    /// Probe the driver, bounded by the poll interval
    pub async fn check_health(&self) -> Result<(), HealthCheckError> {
        let timeout = self.config.poll_interval;
        let check = self
            .checker
            .check_health(&self.config.server, self.config.credentials.as_ref());

        tokio::select! {
            _ = self.cancel.cancelled() => Err(HealthCheckError::Cancelled),
            result = tokio::time::timeout(timeout, check) => {
                result.unwrap_or(Err(HealthCheckError::Timeout { timeout }))
            }
        }
    }

    /// Ask the supervisor to restart the unit, bounded by the poll interval.
    ///
    /// Every call counts as an attempt; every failure, including a missed
    /// deadline or cancellation, counts as an error.
    pub async fn restart_unit(&self) -> Result<(), RestartError> {
        let unit = self.config.unit.as_str();
        let timeout = self.config.poll_interval;
        let deadline = Instant::now() + timeout;

        tracing::warn!("Restarting {}", unit);
        self.metrics.record_restart_attempt();

        let restart = self.restarter.restart_unit(unit, deadline);
        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(RestartError::Cancelled {
                unit: unit.to_string(),
            }),
            result = tokio::time::timeout_at(deadline, restart) => {
                result.unwrap_or_else(|_| Err(RestartError::DeadlineExceeded {
                    unit: unit.to_string(),
                    timeout,
                }))
            }
        };

        match &result {
            Ok(()) => tracing::warn!("Asked driver to restart"),
            Err(e) => {
                self.metrics.record_restart_error();
                if e.is_timeout() {
                    tracing::error!(error = %e, "Driver restart timed out");
                } else {
                    tracing::error!(error = %e, "Failed to restart driver");
                }
            }
        }

        result
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("config", &self.config)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}
