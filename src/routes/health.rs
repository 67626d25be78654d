use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub earth_engine: ComponentHealth,
    pub job: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
}

/// GET /health — process health plus session and job state.
///
/// The Earth Engine session is established lazily, so a missing session is
/// reported but does not degrade the service.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let earth_engine = ComponentHealth {
        status: if state.fetcher.session_established() {
            "ok".to_string()
        } else {
            "not_initialized".to_string()
        },
    };
    let job = ComponentHealth {
        status: state.tracker.query_status().state.to_string(),
    };

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks { earth_engine, job },
    };

    (StatusCode::OK, Json(response))
}
