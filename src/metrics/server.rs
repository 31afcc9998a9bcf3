//! HTTP endpoint serving the restart counters
//!
//! Runs until the shared cancellation token fires, then drains in-flight
//! scrapes for at most `SHUTDOWN_TIMEOUT`.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::WatcherMetrics;
use crate::core::error::MetricsError;

/// Time allowed for in-flight requests once shutdown starts
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus scrape endpoint
pub struct MetricsServer {
    addr: SocketAddr,
    metrics: WatcherMetrics,
}

impl MetricsServer {
    pub fn new(addr: SocketAddr, metrics: WatcherMetrics) -> Self {
        Self { addr, metrics }
    }

    /// Configured listen address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(|| async { "OK" }))
            .with_state(self.metrics.clone())
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener, MetricsError> {
        TcpListener::bind(self.addr)
            .await
            .map_err(|source| MetricsError::Bind {
                addr: self.addr,
                source,
            })
    }

    /// Bind and serve until `cancel` fires
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), MetricsError> {
        let listener = self.bind().await?;
        self.serve_on(listener, cancel).await
    }

    /// Serve on an already bound listener until `cancel` fires
    pub async fn serve_on(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), MetricsError> {
        let local_addr = listener.local_addr().unwrap_or(self.addr);
        let router = self.build_router();

        tracing::info!(addr = %local_addr, "Serving metrics at http://{}/metrics", local_addr);

        let server = axum::serve(listener, router)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .into_future();
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => result.map_err(MetricsError::Serve),
            _ = cancel.cancelled() => {
                match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut server).await {
                    Ok(result) => result.map_err(MetricsError::Serve),
                    Err(_) => {
                        tracing::warn!(
                            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                            "Metrics server did not shut down in time, abandoning open connections"
                        );
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Handler for GET /metrics
async fn metrics_handler(State(metrics): State<WatcherMetrics>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        metrics.export(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, addr
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    type ServerHandle = tokio::task::JoinHandle<Result<(), MetricsError>>;

    type Started = (SocketAddr, CancellationToken, ServerHandle);

    async fn start_server(metrics: WatcherMetrics) -> Started {
        let server = MetricsServer::new(SocketAddr::from(([127, 0, 0, 1], 0)), metrics);
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.serve_on(listener, cancel.clone()));
        (addr, cancel, handle)
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_counters() {
        let metrics = WatcherMetrics::new().unwrap();
        metrics.record_restart_attempt();
        metrics.record_restart_error();

        let (addr, cancel, handle) = start_server(metrics).await;

        let response = http_get(addr, "/metrics").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("text/plain; version=0.0.4"));
        assert!(response.contains("nut_watcher_driver_restarts_total 1"));
        assert!(response.contains("nut_watcher_driver_restart_errors_total 1"));

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, cancel, handle) = start_server(WatcherMetrics::new().unwrap()).await;

        let response = http_get(addr, "/health").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_cancellation_stops_server() {
        let (_addr, cancel, handle) = start_server(WatcherMetrics::new().unwrap()).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should stop after cancellation")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let server = MetricsServer::new(addr, WatcherMetrics::new().unwrap());
        let result = server.serve(CancellationToken::new()).await;
        assert!(matches!(result, Err(MetricsError::Bind { .. })));
    }
}
