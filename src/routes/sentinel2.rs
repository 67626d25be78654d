use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::app_state::AppState;
use crate::config::ResponseMode;
use crate::models::api::ThumbnailResponse;
use crate::models::region::SubmitRequest;
use crate::routes::error::ApiError;
use crate::services::job_tracker::SubmitError;

/// POST /api/sentinel2 — request a Sentinel-2 thumbnail for a polygon.
///
/// In async mode the job is acknowledged immediately and its outcome is read
/// from `/api/status`. In sync mode the handler waits for the thumbnail URL.
pub async fn submit_region(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = match payload {
        Ok(Json(request)) => request,
        // A body sent without a JSON content type carries no coordinates.
        Err(JsonRejection::MissingJsonContentType(_)) => return Err(ApiError::MissingCoordinates),
        Err(e) => return Err(ApiError::MalformedBody(e.body_text())),
    };

    match state.mode {
        ResponseMode::Async => {
            let ack = state.tracker.submit(request)?;
            Ok(Json(ack).into_response())
        }
        ResponseMode::Sync => {
            let region = request.into_region().map_err(SubmitError::Validation)?;
            tracing::info!(points = region.points().len(), "Fetching thumbnail synchronously");
            let reference = state.fetcher.fetch_thumbnail(&region).await?;
            Ok(Json(ThumbnailResponse { url: reference.url }).into_response())
        }
    }
}
