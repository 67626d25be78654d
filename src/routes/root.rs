use axum::http::StatusCode;
use axum::Json;

use crate::models::api::{ErrorBody, MessageResponse};

/// GET / — liveness probe.
pub async fn index() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Backend funcionando".to_string(),
    })
}

/// Fallback for unmatched routes.
pub async fn not_found() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "Ruta no encontrada".to_string(),
            details: None,
        }),
    )
}
