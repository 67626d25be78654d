use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod error;
pub mod health;
pub mod metrics;
pub mod root;
pub mod sentinel2;
pub mod status;

/// JSON bodies above this size are rejected.
const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Full HTTP surface of the service.
pub fn router(state: AppState, prometheus: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/", get(root::index))
        .route("/health", get(health::health_check))
        .route("/api/sentinel2", post(sentinel2::submit_region))
        .route("/api/status", get(status::job_status))
        .fallback(root::not_found)
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(prometheus),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
}
