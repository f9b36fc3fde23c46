//! Observability HTTP surfaces
//!
//! Two small read-only servers: a health endpoint describing the controller
//! and a Prometheus exposition endpoint over the metric registry. Both bind
//! with exponential backoff and are best-effort; the control loop runs with
//! or without them.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::metrics::ScalerMetrics;

/// Bind retry policy: 5 attempts starting at 2s, doubling
pub const BIND_ATTEMPTS: u32 = 5;
pub const BIND_INITIAL_DELAY: Duration = Duration::from_secs(2);

/// Static controller facts served by the health endpoint
#[derive(Debug, Clone)]
pub struct ScalerStatus {
    pub services_monitored: Vec<String>,
    pub scaling_algorithm: String,
    pub docker_available: bool,
    pub metrics_port: u16,
}

/// Router for the health surface
pub fn health_router(status: ScalerStatus) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(status))
}

async fn health(State(status): State<Arc<ScalerStatus>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "services_monitored": status.services_monitored,
        "scaling_algorithm": status.scaling_algorithm,
        "docker_available": status.docker_available,
        "metrics_port": status.metrics_port,
    }))
}

/// Router for the metrics exposition surface
pub fn metrics_router(metrics: Arc<ScalerMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(exposition))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

async fn exposition(State(metrics): State<Arc<ScalerMetrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    )
}

async fn not_found() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}

/// Bind a listener, retrying with exponential backoff
///
/// Returns None after all attempts fail; callers treat that as a warning,
/// never a startup blocker.
pub async fn bind_with_backoff(
    addr: &str,
    attempts: u32,
    initial_delay: Duration,
) -> Option<TcpListener> {
    let mut delay = initial_delay;
    for attempt in 1..=attempts {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Some(listener),
            Err(e) => {
                if attempt < attempts {
                    warn!(
                        "Failed to bind {} (attempt {}/{}): {}; retrying in {}s",
                        addr,
                        attempt,
                        attempts,
                        e,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                } else {
                    warn!("Failed to bind {} after {} attempts: {}", addr, attempts, e);
                }
            }
        }
    }
    None
}

/// Serve a router until the shutdown signal flips, then drain
pub async fn serve(name: &'static str, listener: TcpListener, router: Router, mut shutdown: watch::Receiver<bool>) {
    if let Ok(addr) = listener.local_addr() {
        info!("{} server listening on {}", name, addr);
    }

    let drain = async move {
        loop {
            if shutdown.changed().await.is_err() || *shutdown.borrow() {
                break;
            }
        }
    };

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(drain)
        .await
    {
        warn!("{} server error: {}", name, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_with_backoff_succeeds() {
        let listener = bind_with_backoff("127.0.0.1:0", 1, Duration::from_millis(1)).await;
        assert!(listener.is_some());
    }

    #[tokio::test]
    async fn test_bind_with_backoff_gives_up_on_conflict() {
        let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = holder.local_addr().unwrap().to_string();

        let listener = bind_with_backoff(&addr, 2, Duration::from_millis(5)).await;
        assert!(listener.is_none());
    }

    #[test]
    fn test_status_snapshot_is_cloneable() {
        let status = ScalerStatus {
            services_monitored: vec!["api".to_string(), "postgres".to_string()],
            scaling_algorithm: "linear".to_string(),
            docker_available: false,
            metrics_port: 8090,
        };
        let copy = status.clone();
        assert_eq!(copy.services_monitored.len(), 2);
        assert!(!copy.docker_available);
    }
}
