use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::StatusResponse;

/// GET /api/status — state of the most recent thumbnail job.
pub async fn job_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.tracker.query_status().into())
}
