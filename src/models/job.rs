use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Lifecycle of the tracked thumbnail job.
///
/// `idle -> processing -> completed | failed`, and any terminal state goes back
/// to `processing` on the next submission. There is no cancel transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    #[default]
    Idle,
    Processing,
    Completed,
    Failed,
}

/// Opaque handle a client can resolve into the rendered image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub url: String,
}

impl ImageReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// The single process-wide job record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Job {
    pub state: JobState,
    pub result: Option<ImageReference>,
    pub error_message: Option<String>,
    pub request_id: Option<i64>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// When the terminal state was recorded.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Read-only copy of the job slot handed to callers.
pub type JobSnapshot = Job;

impl Job {
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Failed)
    }
}
