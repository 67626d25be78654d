use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::job::{ImageReference, JobSnapshot, JobState};

pub const PROCESSING_STARTED: &str =
    "El procesamiento ha comenzado. Verifica el estado en 2 minutos.";
pub const STILL_PROCESSING: &str = "Aún procesando. Espera 2 minutos.";
pub const NOTHING_PROCESSING: &str = "No hay procesamiento activo";

/// Immediate reply to an accepted submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub status: JobState,
    pub message: String,
    pub request_id: i64,
}

/// Response for `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusResponse {
    Completed {
        result: ImageReference,
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
        timestamp: DateTime<Utc>,
    },
    Processing {
        message: String,
    },
    Idle {
        message: String,
    },
}

impl From<JobSnapshot> for StatusResponse {
    fn from(job: JobSnapshot) -> Self {
        let timestamp = job.finished_at.unwrap_or_else(Utc::now);
        match (job.state, job.result, job.error_message) {
            (JobState::Completed, Some(result), _) => Self::Completed { result, timestamp },
            (JobState::Failed, _, error) => Self::Error {
                error: error.unwrap_or_default(),
                timestamp,
            },
            (JobState::Processing, _, _) => Self::Processing {
                message: STILL_PROCESSING.to_string(),
            },
            _ => Self::Idle {
                message: NOTHING_PROCESSING.to_string(),
            },
        }
    }
}

/// Response for the synchronous deployment mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailResponse {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
