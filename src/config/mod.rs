use serde::Deserialize;
use std::time::Duration;

/// How `POST /api/sentinel2` answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Acknowledge immediately and run the fetch as a background job.
    #[default]
    Async,
    /// Await the fetch and answer with the thumbnail URL.
    Sync,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Listening port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Listening interface.
    #[serde(default = "default_host")]
    pub host: String,

    /// Google Cloud project registered for Earth Engine
    pub ee_project_id: String,

    /// Service account email
    pub ee_client_email: String,

    /// Service account private key (PEM, newlines may be escaped as `\n`)
    pub ee_private_key: String,

    #[serde(default)]
    pub response_mode: ResponseMode,

    /// Upper bound on session establishment, in seconds.
    #[serde(default = "default_auth_timeout_secs")]
    pub ee_auth_timeout_secs: u64,

    /// Earth Engine REST API root
    #[serde(default = "default_ee_api_url")]
    pub ee_api_url: String,

    /// OAuth 2.0 token endpoint used for the JWT bearer grant
    #[serde(default = "default_ee_token_uri")]
    pub ee_token_uri: String,
}

fn default_port() -> u16 {
    3001
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_auth_timeout_secs() -> u64 {
    120
}

fn default_ee_api_url() -> String {
    "https://earthengine.googleapis.com".to_string()
}

fn default_ee_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The private key with escaped newlines restored.
    /// `.env` files usually carry it on one line.
    pub fn private_key_pem(&self) -> String {
        self.ee_private_key.replace("\\n", "\n")
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.ee_auth_timeout_secs)
    }
}
