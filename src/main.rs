use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sentinel_thumbs::{
    app_state::AppState,
    config::AppConfig,
    routes,
    services::{
        auth::{ServiceAccountAuthenticator, ServiceAccountKey},
        earth_engine::{EarthEngineClient, EarthEngineFetcher},
        session::SessionManager,
        spawner::TokioSpawner,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!(mode = ?config.response_mode, "Initializing sentinel-thumbs server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_histogram!(
        "thumbnail_fetch_seconds",
        "Time spent searching and rendering a thumbnail"
    );
    metrics::describe_counter!("thumbnail_jobs_submitted", "Total thumbnail jobs submitted");
    metrics::describe_counter!("thumbnail_jobs_completed", "Total thumbnail jobs completed");
    metrics::describe_counter!("thumbnail_jobs_failed", "Total thumbnail jobs that failed");

    // The session itself is established on first use
    tracing::info!(project = %config.ee_project_id, "Configuring Earth Engine client");
    let authenticator = ServiceAccountAuthenticator::new(
        ServiceAccountKey {
            project_id: config.ee_project_id.clone(),
            client_email: config.ee_client_email.clone(),
            private_key_pem: config.private_key_pem(),
        },
        config.ee_token_uri.clone(),
        config.ee_api_url.clone(),
    );
    let sessions = SessionManager::new(Arc::new(authenticator), config.auth_timeout());
    let client = EarthEngineClient::new(config.ee_api_url.clone(), config.ee_project_id.clone());
    let fetcher = EarthEngineFetcher::new(sessions, client);

    let state = AppState::new(
        Arc::new(fetcher),
        Arc::new(TokioSpawner),
        config.response_mode,
    );

    let app = routes::router(state, prometheus_handle);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Backend listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
