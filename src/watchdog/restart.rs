//! Asking systemd to restart the driver unit

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::Instant;

use crate::core::error::RestartError;

/// Capability used by the watcher to restart the driver
#[async_trait]
pub trait UnitRestarter: Send + Sync {
    /// Request a restart of `unit`, giving up at `deadline`
    async fn restart_unit(&self, unit: &str, deadline: Instant) -> Result<(), RestartError>;
}

/// Restarts units through `systemctl`
///
/// The job is queued with `--job-mode=replace` so a pending restart of the
/// same unit is replaced instead of stacked, and `--no-block` so the call
/// returns once systemd has accepted the job.
#[derive(Debug, Clone)]
pub struct SystemctlRestarter {
    program: PathBuf,
}

impl Default for SystemctlRestarter {
    fn default() -> Self {
        Self {
            program: PathBuf::from("systemctl"),
        }
    }
}

impl SystemctlRestarter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different `systemctl` binary
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, unit: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["restart", "--no-block", "--job-mode=replace", "--", unit])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl UnitRestarter for SystemctlRestarter {
    async fn restart_unit(&self, unit: &str, deadline: Instant) -> Result<(), RestartError> {
        let started = Instant::now();

        let child = self
            .command(unit)
            .spawn()
            .map_err(|e| RestartError::SupervisorUnavailable {
                reason: format!("failed to run {}: {}", self.program.display(), e),
            })?;

        // Dropping the future on timeout kills the child
        let output = match tokio::time::timeout_at(deadline, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| RestartError::SupervisorUnavailable {
                reason: format!("failed to wait for {}: {}", self.program.display(), e),
            })?,
            Err(_) => {
                return Err(RestartError::DeadlineExceeded {
                    unit: unit.to_string(),
                    timeout: deadline.saturating_duration_since(started),
                })
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let reason = if stderr.is_empty() {
            format!("{} exited with {}", self.program.display(), output.status)
        } else {
            stderr
        };

        if reason.contains("Failed to connect to bus") {
            Err(RestartError::SupervisorUnavailable { reason })
        } else {
            Err(RestartError::Rejected {
                unit: unit.to_string(),
                reason,
            })
        }
    }
}
