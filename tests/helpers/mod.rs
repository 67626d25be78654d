//! Shared helpers for HTTP-level tests

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use sentinel_thumbs::{
    app_state::AppState,
    config::ResponseMode,
    models::{job::ImageReference, region::Region},
    routes,
    services::{
        fetcher::{FetchError, ImageryFetcher},
        spawner::TokioSpawner,
    },
};

/// Fetcher that replays a fixed list of outcomes, one per call.
#[derive(Default)]
pub struct ScriptedFetcher {
    outcomes: Mutex<VecDeque<(Duration, Result<ImageReference, FetchError>)>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, delay: Duration, outcome: Result<ImageReference, FetchError>) -> Self {
        self.outcomes.lock().unwrap().push_back((delay, outcome));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageryFetcher for ScriptedFetcher {
    async fn fetch_thumbnail(&self, _region: &Region) -> Result<ImageReference, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.outcomes.lock().unwrap().pop_front();
        match next {
            Some((delay, outcome)) => {
                sleep(delay).await;
                outcome
            }
            None => Err(FetchError::RemoteService("no scripted outcome".to_string())),
        }
    }

    fn session_established(&self) -> bool {
        self.calls() > 0
    }
}

/// Serve the full router on an ephemeral port and return its base URL.
pub async fn spawn_app(fetcher: Arc<ScriptedFetcher>, mode: ResponseMode) -> String {
    let state = AppState::new(fetcher, Arc::new(TokioSpawner), mode);
    let prometheus = Arc::new(PrometheusBuilder::new().build_recorder().handle());
    let app = routes::router(state, prometheus);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server error");
    });

    format!("http://{addr}")
}

pub async fn get_status(client: &reqwest::Client, base_url: &str) -> Value {
    client
        .get(format!("{base_url}/api/status"))
        .send()
        .await
        .expect("Status request failed")
        .json()
        .await
        .expect("Status body was not JSON")
}

/// Poll `/api/status` until the job leaves `processing` (with timeout).
pub async fn poll_until_settled(
    client: &reqwest::Client,
    base_url: &str,
    timeout: Duration,
) -> Value {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let body = get_status(client, base_url).await;
        if body["status"] != "processing" {
            return body;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "Job did not settle within {timeout:?}"
        );
        sleep(Duration::from_millis(20)).await;
    }
}

pub fn square() -> Value {
    serde_json::json!([[0, 0], [0, 1], [1, 1], [1, 0], [0, 0]])
}
