//! Earth Engine REST client and the [`ImageryFetcher`] built on it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::job::ImageReference;
use crate::models::region::Region;
use crate::services::fetcher::{FetchError, ImageryFetcher};
use crate::services::session::{Session, SessionManager};

/// Project hosting the public data catalogue.
const PUBLIC_CATALOG_PROJECT: &str = "earthengine-public";

/// Fixed search and rendering parameters for the Sentinel-2 thumbnail.
#[derive(Debug, Clone)]
pub struct ImageSearch {
    pub collection: &'static str,
    pub start_time: &'static str,
    pub end_time: &'static str,
    pub cloud_property: &'static str,
    pub max_cloud_percentage: f64,
    pub bands: [&'static str; 3],
    pub min: f64,
    pub max: f64,
    pub width: u32,
    pub height: u32,
    pub file_format: &'static str,
}

impl Default for ImageSearch {
    fn default() -> Self {
        Self {
            collection: "COPERNICUS/S2_SR",
            start_time: "2024-01-01T00:00:00Z",
            end_time: "2024-06-01T00:00:00Z",
            cloud_property: "CLOUDY_PIXEL_PERCENTAGE",
            max_cloud_percentage: 20.0,
            bands: ["B4", "B3", "B2"],
            min: 0.0,
            max: 3000.0,
            width: 512,
            height: 512,
            file_format: "PNG",
        }
    }
}

impl ImageSearch {
    /// `listImages` filter; image properties live under `properties.` in the filter grammar.
    fn filter(&self) -> String {
        format!(
            "properties.{} < {}",
            self.cloud_property, self.max_cloud_percentage
        )
    }

    fn thumbnail_request(&self, image_id: &str) -> Value {
        json!({
            "expression": {
                "result": "0",
                "values": {
                    "0": {
                        "functionInvocationValue": {
                            "functionName": "Image.load",
                            "arguments": { "id": { "constantValue": image_id } }
                        }
                    }
                }
            },
            "fileFormat": self.file_format,
            "bandIds": self.bands,
            "visualizationOptions": {
                "ranges": [{ "min": self.min, "max": self.max }]
            },
            "grid": {
                "dimensions": { "width": self.width, "height": self.height }
            }
        })
    }
}

/// One catalogue entry returned by `listImages`.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageSummary {
    pub id: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

impl ImageSummary {
    fn cloud_percentage(&self, property: &str) -> Option<f64> {
        self.properties.get(property).and_then(Value::as_f64)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListImagesResponse {
    #[serde(default)]
    images: Vec<ImageSummary>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct CreatedThumbnail {
    name: String,
}

/// Thin client over the Earth Engine v1 REST API.
///
/// No request timeout is configured: a stalled search or render waits for the remote side.
pub struct EarthEngineClient {
    http: Client,
    api_url: String,
    project: String,
    search: ImageSearch,
}

impl EarthEngineClient {
    pub fn new(api_url: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            project: project.into(),
            search: ImageSearch::default(),
        }
    }

    /// Least cloudy image of the collection intersecting `region` inside the date window.
    pub async fn find_least_cloudy(
        &self,
        session: &Session,
        region: &Region,
    ) -> Result<ImageSummary, FetchError> {
        let url = format!(
            "{}/v1/projects/{}/assets/{}:listImages",
            self.api_url, PUBLIC_CATALOG_PROJECT, self.search.collection
        );
        let region_geojson = region.to_geojson().to_string();
        let filter = self.search.filter();
        let property = self.search.cloud_property;

        let mut best: Option<(f64, ImageSummary)> = None;
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("startTime", self.search.start_time.to_string()),
                ("endTime", self.search.end_time.to_string()),
                ("region", region_geojson.clone()),
                ("filter", filter.clone()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(&session.access_token)
                .query(&query)
                .send()
                .await?;
            let page: ListImagesResponse = check_response(response).await?.json().await?;

            tracing::debug!(images = page.images.len(), "Received listImages page");

            for image in page.images {
                let Some(cloud) = image.cloud_percentage(property) else {
                    continue;
                };
                if best.as_ref().map_or(true, |(lowest, _)| cloud < *lowest) {
                    best = Some((cloud, image));
                }
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        best.map(|(_, image)| image).ok_or(FetchError::NoResults)
    }

    /// Registers a thumbnail render of `image_id` and returns the URL serving it.
    pub async fn create_thumbnail(
        &self,
        session: &Session,
        image_id: &str,
    ) -> Result<ImageReference, FetchError> {
        let response = self
            .http
            .post(format!(
                "{}/v1/projects/{}/thumbnails",
                self.api_url, self.project
            ))
            .bearer_auth(&session.access_token)
            .json(&self.search.thumbnail_request(image_id))
            .send()
            .await?;
        let thumbnail: CreatedThumbnail = check_response(response).await?.json().await?;

        Ok(ImageReference::new(format!(
            "{}/v1/{}:getPixels",
            self.api_url, thumbnail.name
        )))
    }
}

async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(FetchError::Authentication(format!("{status}: {body}")));
    }
    Err(FetchError::RemoteService(format!("{status}: {body}")))
}

/// Session-aware fetcher: authenticate once, search, then render.
///
/// A rejected bearer token is invalidated so the next fetch renews it.
pub struct EarthEngineFetcher {
    sessions: SessionManager,
    client: EarthEngineClient,
}

impl EarthEngineFetcher {
    pub fn new(sessions: SessionManager, client: EarthEngineClient) -> Self {
        Self { sessions, client }
    }

    pub async fn ensure_session(&self) -> Result<std::sync::Arc<Session>, FetchError> {
        self.sessions.ensure_session().await
    }
}

#[async_trait]
impl ImageryFetcher for EarthEngineFetcher {
    async fn fetch_thumbnail(&self, region: &Region) -> Result<ImageReference, FetchError> {
        let session = self.ensure_session().await?;

        let result = async {
            let image = self.client.find_least_cloudy(&session, region).await?;
            tracing::info!(
                image_id = %image.id,
                cloud = ?image.cloud_percentage(self.client.search.cloud_property),
                "Selected least cloudy image"
            );
            self.client.create_thumbnail(&session, &image.id).await
        }
        .await;

        if let Err(FetchError::Authentication(_)) = &result {
            self.sessions.invalidate_token(&session).await;
        }
        result
    }

    fn session_established(&self) -> bool {
        self.sessions.is_established()
    }
}
