//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  — Prometheus text format
//!   GET /healthz  — Liveness probe (always 200 if process is running)
//!   GET /readyz   — Readiness probe (200 if the storage root is writable)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use bitdrop_storage::Layout;
use prometheus_client::metrics::{counter::Counter, family::Family};
use prometheus_client::{encoding::text::encode, registry::Registry};
use std::sync::Arc;

type Labels = Vec<(String, String)>;

/// Counters for the four request families.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    chunks_received: Family<Labels, Counter>,
    uploads_finalized: Family<Labels, Counter>,
    decrypts: Family<Labels, Counter>,
    deletions: Family<Labels, Counter>,
}

impl Metrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "bitdrop_chunks_received",
            "Chunk submissions by result",
            metrics.chunks_received.clone(),
        );
        registry.register(
            "bitdrop_uploads_finalized",
            "Finalize requests by result",
            metrics.uploads_finalized.clone(),
        );
        registry.register(
            "bitdrop_decrypt",
            "Server-side decryptions by status",
            metrics.decrypts.clone(),
        );
        registry.register(
            "bitdrop_deletions",
            "Delete requests by result",
            metrics.deletions.clone(),
        );
        metrics
    }

    pub fn chunk(&self, result: &str) {
        inc(&self.chunks_received, "result", result);
    }

    pub fn finalize(&self, result: &str) {
        inc(&self.uploads_finalized, "result", result);
    }

    pub fn decrypt(&self, status: &str) {
        inc(&self.decrypts, "status", status);
    }

    pub fn deletion(&self, result: &str) {
        inc(&self.deletions, "result", result);
    }
}

fn inc(family: &Family<Labels, Counter>, key: &str, value: &str) {
    family
        .get_or_create(&vec![(key.to_string(), value.to_string())])
        .inc();
}

/// Shared state of the metrics server
#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<Registry>,
    pub layout: Layout,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

/// Serve Prometheus metrics and health endpoints on `addr` (e.g. "127.0.0.1:9100")
pub async fn serve(addr: String, state: HealthState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz, /readyz");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &state.registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Liveness probe: returns 200 if the process is running.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe: returns 200 if the storage root is writable, 503 otherwise.
async fn readyz_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match bitdrop_storage::check_health(&state.layout).await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!("readiness check failed: {e:#}");
            (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable")
        }
    }
}
