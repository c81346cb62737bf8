//! Health and metrics endpoint
//!
//! A small axum surface over the shared [`HealthRegistry`] and the process
//! Prometheus registry. The watcher writes component health; the endpoint
//! only reads, so the router's state is the registry handle itself.

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};
use tracing::info;

use crate::health::{ComponentStatus, HealthRegistry};

/// Liveness: only an outright component failure takes the service down; a
/// degraded component means a stale snapshot, which the tick loop tolerates.
async fn healthz(State(registry): State<HealthRegistry>) -> impl IntoResponse {
    let health = registry.health().await;
    let status_code = if health.status == ComponentStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status_code, Json(health))
}

/// Readiness: gated on initialization and on no component being down.
async fn readyz(State(registry): State<HealthRegistry>) -> impl IntoResponse {
    let readiness = registry.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

/// Prometheus exposition of everything registered in the process.
async fn metrics() -> impl IntoResponse {
    let mut buffer = Vec::new();
    let status_code = match TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => StatusCode::OK,
        Err(error) => {
            buffer = error.to_string().into_bytes();
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status_code,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Build the endpoint router over the shared health registry.
pub fn router(registry: HealthRegistry) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(registry)
}

/// Bind and serve the endpoint; runs until the owning task is aborted.
pub async fn serve(port: u16, registry: HealthRegistry) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Serving health and metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(registry)).await?;
    Ok(())
}
