use futures::future::BoxFuture;

/// Runs background jobs on behalf of the job tracker.
///
/// Ownership of a spawned future passes to the implementation, which must
/// drive it to completion. No cancellation handle is returned: a scheduled
/// job is never aborted by later submissions.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, name: &'static str, task: BoxFuture<'static, ()>);
}

/// Detaches tasks onto the ambient tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

impl TaskSpawner for TokioSpawner {
    fn spawn(&self, name: &'static str, task: BoxFuture<'static, ()>) {
        tracing::debug!(task = name, "Spawning background task");
        // The runtime owns the task once the handle is dropped.
        drop(tokio::spawn(task));
    }
}
