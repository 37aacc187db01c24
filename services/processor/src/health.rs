use crate::config::HealthConfig;
use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Readiness reported by the probe endpoints.
#[derive(Debug, Clone, Default)]
pub struct ReadinessFlag(Arc<AtomicBool>);

impl ReadinessFlag {
    pub fn set(&self, ready: bool) {
        let previous = self.0.swap(ready, Ordering::SeqCst);
        if previous != ready {
            if ready {
                info!("Worker marked as ready");
            } else {
                info!("Worker marked as not ready");
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Create the health probe router
pub fn create_router(readiness: ReadinessFlag) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/processor/health/liveness", get(liveness))
        .route("/processor/health/readiness", get(readiness_probe))
        .layer(TraceLayer::new_for_http())
        .with_state(readiness)
}

/// Simple health check
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Simple readiness check
async fn ready(State(readiness): State<ReadinessFlag>) -> impl IntoResponse {
    if readiness.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

/// Liveness probe: the process is up
async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive" })))
}

/// Readiness probe: the intake loop is accepting work
async fn readiness_probe(State(readiness): State<ReadinessFlag>) -> impl IntoResponse {
    if readiness.is_ready() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not_ready" })),
        )
    }
}

/// Serve the probes until `shutdown` is cancelled
pub async fn start_health_server(
    readiness: ReadinessFlag,
    config: &HealthConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = create_router(readiness);
    let addr = format!("{}:{}", config.host, config.port);

    info!(
        address = %addr,
        liveness = "/processor/health/liveness",
        readiness = "/processor/health/readiness",
        "Starting health server"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind health server address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("Health server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_liveness_always_ok() {
        let router = create_router(ReadinessFlag::default());

        let (status, body) = get(router.clone(), "/processor/health/liveness").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"alive"}"#);

        let (status, body) = get(router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn test_readiness_follows_flag() {
        let readiness = ReadinessFlag::default();
        let router = create_router(readiness.clone());

        let (status, body) = get(router.clone(), "/processor/health/readiness").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, r#"{"status":"not_ready"}"#);

        readiness.set(true);

        let (status, body) = get(router.clone(), "/processor/health/readiness").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"ready"}"#);

        let (status, body) = get(router, "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "READY");
    }
}
