use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::api::ErrorBody;
use crate::services::fetcher::FetchError;
use crate::services::job_tracker::SubmitError;

/// Errors surfaced directly to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Faltan coordenadas")]
    MissingCoordinates,

    #[error("Cuerpo de la solicitud inválido")]
    MalformedBody(String),

    #[error("No se encontraron imágenes")]
    NoImages,

    #[error("Error interno")]
    Internal(String),
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Validation(_) => ApiError::MissingCoordinates,
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NoResults => ApiError::NoImages,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            ApiError::MissingCoordinates => (StatusCode::BAD_REQUEST, None),
            ApiError::MalformedBody(details) => (StatusCode::BAD_REQUEST, Some(details.clone())),
            ApiError::NoImages => (StatusCode::NOT_FOUND, None),
            ApiError::Internal(details) => {
                tracing::error!(details = %details, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Some(details.clone()))
            }
        };

        let body = ErrorBody {
            error: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}
