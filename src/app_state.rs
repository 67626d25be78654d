use std::sync::Arc;

use crate::config::ResponseMode;
use crate::services::{fetcher::ImageryFetcher, job_tracker::JobTracker, spawner::TaskSpawner};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<JobTracker>,
    pub fetcher: Arc<dyn ImageryFetcher>,
    pub mode: ResponseMode,
}

impl AppState {
    pub fn new(
        fetcher: Arc<dyn ImageryFetcher>,
        spawner: Arc<dyn TaskSpawner>,
        mode: ResponseMode,
    ) -> Self {
        Self {
            tracker: Arc::new(JobTracker::new(fetcher.clone(), spawner)),
            fetcher,
            mode,
        }
    }
}
