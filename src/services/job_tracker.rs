//! Single-slot asynchronous job tracker.
//!
//! One [`Job`] record exists per process. A submission resets it to
//! `processing` and schedules one background fetch; whichever fetch resolves
//! last writes the terminal state (last-resolved-wins). Overlapping
//! submissions are neither rejected nor queued.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::models::api::{Acknowledgement, PROCESSING_STARTED};
use crate::models::job::{ImageReference, Job, JobSnapshot, JobState};
use crate::models::region::{Region, SubmitRequest};
use crate::services::fetcher::ImageryFetcher;
use crate::services::spawner::TaskSpawner;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Faltan coordenadas")]
    Validation(#[source] garde::Report),
}

/// Identity of one submission, carried by its background job.
#[derive(Debug, Clone, Copy)]
struct JobTicket {
    request_id: i64,
    submitted_at: DateTime<Utc>,
}

/// Mutex-guarded storage for the one job record.
#[derive(Debug, Clone, Default)]
pub struct JobSlot {
    inner: Arc<Mutex<Job>>,
}

impl JobSlot {
    fn lock(&self) -> MutexGuard<'_, Job> {
        // Every write replaces the whole record, so a poisoned lock still holds a coherent job.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.lock().clone()
    }

    fn begin(&self, ticket: JobTicket) {
        *self.lock() = Job {
            state: JobState::Processing,
            request_id: Some(ticket.request_id),
            submitted_at: Some(ticket.submitted_at),
            ..Job::default()
        };
    }

    fn record_success(&self, ticket: JobTicket, result: ImageReference) {
        *self.lock() = Job {
            state: JobState::Completed,
            result: Some(result),
            error_message: None,
            request_id: Some(ticket.request_id),
            submitted_at: Some(ticket.submitted_at),
            finished_at: Some(Utc::now()),
        };
    }

    fn record_failure(&self, ticket: JobTicket, message: String) {
        *self.lock() = Job {
            state: JobState::Failed,
            result: None,
            error_message: Some(message),
            request_id: Some(ticket.request_id),
            submitted_at: Some(ticket.submitted_at),
            finished_at: Some(Utc::now()),
        };
    }
}

pub struct JobTracker {
    slot: JobSlot,
    fetcher: Arc<dyn ImageryFetcher>,
    spawner: Arc<dyn TaskSpawner>,
}

impl JobTracker {
    pub fn new(fetcher: Arc<dyn ImageryFetcher>, spawner: Arc<dyn TaskSpawner>) -> Self {
        Self {
            slot: JobSlot::default(),
            fetcher,
            spawner,
        }
    }

    /// Accepts a region and schedules its fetch without waiting for it.
    ///
    /// An absent or empty region is rejected before the slot is touched.
    pub fn submit(&self, request: SubmitRequest) -> Result<Acknowledgement, SubmitError> {
        let region = request.into_region().map_err(SubmitError::Validation)?;

        let submitted_at = Utc::now();
        let ticket = JobTicket {
            request_id: submitted_at.timestamp_millis(),
            submitted_at,
        };
        self.slot.begin(ticket);

        metrics::counter!("thumbnail_jobs_submitted").increment(1);
        tracing::info!(
            request_id = ticket.request_id,
            points = region.points().len(),
            "Thumbnail job accepted"
        );

        let job = run_job(self.slot.clone(), self.fetcher.clone(), region, ticket);
        self.spawner.spawn("thumbnail-job", job.boxed());

        Ok(Acknowledgement {
            status: JobState::Processing,
            message: PROCESSING_STARTED.to_string(),
            request_id: ticket.request_id,
        })
    }

    pub fn query_status(&self) -> JobSnapshot {
        self.slot.snapshot()
    }
}

/// Background half of a submission. Always leaves a terminal state behind,
/// including when the fetch panics.
async fn run_job(
    slot: JobSlot,
    fetcher: Arc<dyn ImageryFetcher>,
    region: Region,
    ticket: JobTicket,
) {
    tracing::info!(request_id = ticket.request_id, "Background processing started");
    let start = Instant::now();

    let outcome = AssertUnwindSafe(fetcher.fetch_thumbnail(&region))
        .catch_unwind()
        .await;

    metrics::histogram!("thumbnail_fetch_seconds").record(start.elapsed().as_secs_f64());

    match outcome {
        Ok(Ok(reference)) => {
            tracing::info!(
                request_id = ticket.request_id,
                url = %reference.url,
                "Thumbnail job completed"
            );
            metrics::counter!("thumbnail_jobs_completed").increment(1);
            slot.record_success(ticket, reference);
        }
        Ok(Err(e)) => {
            tracing::error!(request_id = ticket.request_id, error = %e, "Thumbnail job failed");
            metrics::counter!("thumbnail_jobs_failed").increment(1);
            slot.record_failure(ticket, e.to_string());
        }
        Err(_) => {
            tracing::error!(request_id = ticket.request_id, "Thumbnail job panicked");
            metrics::counter!("thumbnail_jobs_failed").increment(1);
            slot.record_failure(ticket, "Thumbnail job aborted unexpectedly".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fetcher::FetchError;
    use crate::services::spawner::TokioSpawner;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::oneshot;

    type Gate = oneshot::Receiver<Result<ImageReference, FetchError>>;

    /// Fetcher whose outcome per region is released by the test.
    #[derive(Default)]
    struct GatedFetcher {
        gates: Mutex<HashMap<String, Gate>>,
    }

    impl GatedFetcher {
        fn gate(&self, points: &[[f64; 2]]) -> oneshot::Sender<Result<ImageReference, FetchError>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(key(points), rx);
            tx
        }
    }

    fn key(points: &[[f64; 2]]) -> String {
        format!("{:?}", points.first())
    }

    #[async_trait]
    impl ImageryFetcher for GatedFetcher {
        async fn fetch_thumbnail(&self, region: &Region) -> Result<ImageReference, FetchError> {
            let gate = self.gates.lock().unwrap().remove(&key(region.points()));
            match gate {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(FetchError::RemoteService("gate dropped".into()))),
                None => Err(FetchError::RemoteService("no gate for region".into())),
            }
        }

        fn session_established(&self) -> bool {
            true
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl ImageryFetcher for PanickingFetcher {
        async fn fetch_thumbnail(&self, _region: &Region) -> Result<ImageReference, FetchError> {
            panic!("renderer exploded");
        }

        fn session_established(&self) -> bool {
            false
        }
    }

    fn square(origin: f64) -> Vec<[f64; 2]> {
        vec![
            [origin, origin],
            [origin, origin + 1.0],
            [origin + 1.0, origin + 1.0],
            [origin + 1.0, origin],
            [origin, origin],
        ]
    }

    fn tracker(fetcher: Arc<dyn ImageryFetcher>) -> JobTracker {
        JobTracker::new(fetcher, Arc::new(TokioSpawner))
    }

    async fn wait_until(
        tracker: &JobTracker,
        done: impl Fn(&JobSnapshot) -> bool,
    ) -> JobSnapshot {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let snapshot = tracker.query_status();
                if done(&snapshot) {
                    return snapshot;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not reach the expected state")
    }

    #[tokio::test]
    async fn test_starts_idle() {
        let tracker = tracker(Arc::new(GatedFetcher::default()));
        assert_eq!(tracker.query_status(), Job::default());
        assert_eq!(tracker.query_status().state, JobState::Idle);
    }

    #[tokio::test]
    async fn test_missing_region_leaves_state_unchanged() {
        let tracker = tracker(Arc::new(GatedFetcher::default()));

        let err = tracker.submit(SubmitRequest::default()).unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
        assert_eq!(err.to_string(), "Faltan coordenadas");
        assert_eq!(tracker.query_status(), Job::default());

        let err = tracker.submit(SubmitRequest::new(vec![])).unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
        assert_eq!(tracker.query_status(), Job::default());
    }

    #[tokio::test]
    async fn test_missing_region_keeps_terminal_state() {
        let fetcher = Arc::new(GatedFetcher::default());
        let tracker = tracker(fetcher.clone());
        let tx = fetcher.gate(&square(0.0));

        tracker.submit(SubmitRequest::new(square(0.0))).unwrap();
        tx.send(Ok(ImageReference::new("ref-123"))).unwrap();
        let completed = wait_until(&tracker, Job::is_terminal).await;

        assert!(tracker.submit(SubmitRequest::default()).is_err());
        assert_eq!(tracker.query_status(), completed);
    }

    #[tokio::test]
    async fn test_successful_fetch_completes_job() {
        let fetcher = Arc::new(GatedFetcher::default());
        let tracker = tracker(fetcher.clone());
        let tx = fetcher.gate(&square(0.0));

        let ack = tracker.submit(SubmitRequest::new(square(0.0))).unwrap();
        assert_eq!(ack.status, JobState::Processing);
        assert_eq!(tracker.query_status().state, JobState::Processing);

        tx.send(Ok(ImageReference::new("ref-123"))).unwrap();
        let job = wait_until(&tracker, Job::is_terminal).await;

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.result, Some(ImageReference::new("ref-123")));
        assert_eq!(job.error_message, None);
        assert_eq!(job.request_id, Some(ack.request_id));
        assert!(job.finished_at.unwrap() >= job.submitted_at.unwrap());
    }

    #[tokio::test]
    async fn test_empty_archive_fails_job() {
        let fetcher = Arc::new(GatedFetcher::default());
        let tracker = tracker(fetcher.clone());
        let tx = fetcher.gate(&square(0.0));

        tracker.submit(SubmitRequest::new(square(0.0))).unwrap();
        tx.send(Err(FetchError::NoResults)).unwrap();
        let job = wait_until(&tracker, Job::is_terminal).await;

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error_message.as_deref(), Some("No se encontraron imágenes"));
        assert_eq!(job.result, None);
    }

    #[tokio::test]
    async fn test_auth_failure_fails_job() {
        let fetcher = Arc::new(GatedFetcher::default());
        let tracker = tracker(fetcher.clone());
        let tx = fetcher.gate(&square(0.0));

        tracker.submit(SubmitRequest::new(square(0.0))).unwrap();
        tx.send(Err(FetchError::Authentication("invalid_grant".into())))
            .unwrap();
        let job = wait_until(&tracker, Job::is_terminal).await;

        assert_eq!(job.state, JobState::Failed);
        assert!(job.error_message.unwrap().contains("invalid_grant"));
        assert_eq!(job.result, None);
    }

    #[tokio::test]
    async fn test_panicking_fetch_still_records_failure() {
        let tracker = tracker(Arc::new(PanickingFetcher));

        tracker.submit(SubmitRequest::new(square(0.0))).unwrap();
        let job = wait_until(&tracker, Job::is_terminal).await;

        assert_eq!(job.state, JobState::Failed);
        assert!(job.error_message.is_some());
    }

    #[tokio::test]
    async fn test_resubmission_resets_to_processing() {
        let fetcher = Arc::new(GatedFetcher::default());
        let tracker = tracker(fetcher.clone());
        let first = fetcher.gate(&square(0.0));
        let _second = fetcher.gate(&square(5.0));

        tracker.submit(SubmitRequest::new(square(0.0))).unwrap();
        first.send(Ok(ImageReference::new("ref-123"))).unwrap();
        wait_until(&tracker, Job::is_terminal).await;

        tracker.submit(SubmitRequest::new(square(5.0))).unwrap();
        let job = tracker.query_status();
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.result, None);
        assert_eq!(job.finished_at, None);
    }

    #[tokio::test]
    async fn test_last_resolved_wins_over_first_submitted() {
        let fetcher = Arc::new(GatedFetcher::default());
        let tracker = tracker(fetcher.clone());
        let first = fetcher.gate(&square(0.0));
        let second = fetcher.gate(&square(5.0));

        tracker.submit(SubmitRequest::new(square(0.0))).unwrap();
        tracker.submit(SubmitRequest::new(square(5.0))).unwrap();

        first.send(Ok(ImageReference::new("ref-first"))).unwrap();
        wait_until(&tracker, |job| {
            job.result == Some(ImageReference::new("ref-first"))
        })
        .await;

        second.send(Ok(ImageReference::new("ref-second"))).unwrap();
        let job = wait_until(&tracker, |job| {
            job.result == Some(ImageReference::new("ref-second"))
        })
        .await;

        assert_eq!(job.state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_last_resolved_wins_over_last_submitted() {
        let fetcher = Arc::new(GatedFetcher::default());
        let tracker = tracker(fetcher.clone());
        let first = fetcher.gate(&square(0.0));
        let second = fetcher.gate(&square(5.0));

        tracker.submit(SubmitRequest::new(square(0.0))).unwrap();
        tracker.submit(SubmitRequest::new(square(5.0))).unwrap();

        second.send(Err(FetchError::NoResults)).unwrap();
        wait_until(&tracker, |job| job.state == JobState::Failed).await;

        first.send(Ok(ImageReference::new("ref-first"))).unwrap();
        let job = wait_until(&tracker, |job| job.state == JobState::Completed).await;

        assert_eq!(job.result, Some(ImageReference::new("ref-first")));
        assert_eq!(job.error_message, None);

        // Nothing else is in flight, so the slot stays put.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(tracker.query_status(), job);
    }
}
