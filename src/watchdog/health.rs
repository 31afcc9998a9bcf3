//! Driver health checks
//!
//! A driver counts as alive only when the NUT server it feeds can list at
//! least one device. An empty list means the driver is running but serving
//! nothing, which is exactly the lock-up the watcher exists to catch.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use super::nut::NutClient;
use crate::core::config::Credentials;
use crate::core::error::HealthCheckError;

/// How long to wait for the server to acknowledge `LOGOUT`
const LOGOUT_TIMEOUT: Duration = Duration::from_millis(500);

/// Capability used by the watcher to probe the driver
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Probe `server`, logging in first when `credentials` are given
    async fn check_health(
        &self,
        server: &str,
        credentials: Option<&Credentials>,
    ) -> Result<(), HealthCheckError>;
}

/// Health checker talking to a NUT server
#[derive(Debug, Default, Clone)]
pub struct NutHealthChecker;

impl NutHealthChecker {
    pub fn new() -> Self {
        Self
    }

    async fn probe(
        client: &mut NutClient,
        credentials: Option<&Credentials>,
    ) -> Result<usize, HealthCheckError> {
        if let Some(credentials) = credentials {
            tracing::trace!("Authenticating with server as {}", credentials.username);
            client
                .authenticate(&credentials.username, credentials.password.expose_secret())
                .await
                .map_err(|source| HealthCheckError::Authenticate {
                    username: credentials.username.clone(),
                    source,
                })?;
        }

        tracing::trace!("Listing devices");
        let devices = client
            .list_ups()
            .await
            .map_err(|source| HealthCheckError::ListDevices { source })?;

        if devices.is_empty() {
            return Err(HealthCheckError::NoDevices);
        }

        Ok(devices.len())
    }
}

#[async_trait]
impl HealthChecker for NutHealthChecker {
    async fn check_health(
        &self,
        server: &str,
        credentials: Option<&Credentials>,
    ) -> Result<(), HealthCheckError> {
        tracing::debug!(server, "Checking if UPS driver is alive");

        tracing::trace!(server, "Connecting to NUT server");
        let mut client = NutClient::connect(server).await.map_err(|source| {
            HealthCheckError::Connect {
                server: server.to_string(),
                source,
            }
        })?;

        let result = Self::probe(&mut client, credentials).await;

        // Best effort: the outcome never changes the verdict
        match tokio::time::timeout(LOGOUT_TIMEOUT, client.logout()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::trace!(error = %e, "Logout failed, dropping connection"),
            Err(_) => tracing::trace!("Logout not acknowledged, dropping connection"),
        }

        let devices = result?;
        tracing::trace!(devices, "UPS is healthy");
        Ok(())
    }
}
