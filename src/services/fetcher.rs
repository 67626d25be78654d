use async_trait::async_trait;
use std::time::Duration;

use crate::models::job::ImageReference;
use crate::models::region::Region;

/// Turns a region into a rendered thumbnail reference.
#[async_trait]
pub trait ImageryFetcher: Send + Sync {
    async fn fetch_thumbnail(&self, region: &Region) -> Result<ImageReference, FetchError>;

    /// Whether the upstream session has been established yet.
    fn session_established(&self) -> bool;
}

/// Failures while talking to the imagery service.
///
/// Messages are carried as text so a single attempt's outcome can be shared
/// between every caller awaiting it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Earth Engine rejected the service account credentials: {0}")]
    Authentication(String),

    #[error("Earth Engine authentication did not finish within {0:?}")]
    Timeout(Duration),

    #[error("No se encontraron imágenes")]
    NoResults,

    #[error("Earth Engine request failed: {0}")]
    RemoteService(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::RemoteService(err.to_string())
    }
}
