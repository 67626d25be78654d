//! Service-account authentication against Google's OAuth endpoint.
//!
//! Implements the JWT bearer grant: an RS256 assertion signed with the
//! service-account key is exchanged for an access token, then the project is
//! checked against the Earth Engine API before the session is handed out.
//! Renewing the token repeats the grant without the project check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::services::fetcher::FetchError;
use crate::services::session::{Authenticator, Session};

const EARTH_ENGINE_SCOPES: &str =
    "https://www.googleapis.com/auth/earthengine https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Service-account credentials for Earth Engine.
#[derive(Clone)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key_pem: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

impl TokenResponse {
    fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at + chrono::Duration::seconds(self.expires_in)
    }
}

pub struct ServiceAccountAuthenticator {
    http: Client,
    key: ServiceAccountKey,
    token_uri: String,
    api_url: String,
}

impl ServiceAccountAuthenticator {
    pub fn new(
        key: ServiceAccountKey,
        token_uri: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            key,
            token_uri: token_uri.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn claims(&self, now: DateTime<Utc>) -> AssertionClaims {
        let iat = now.timestamp();
        AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: EARTH_ENGINE_SCOPES.to_string(),
            aud: self.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        }
    }

    fn signed_assertion(&self, now: DateTime<Utc>) -> Result<String, FetchError> {
        let key = EncodingKey::from_rsa_pem(self.key.private_key_pem.as_bytes())
            .map_err(|e| FetchError::Authentication(format!("invalid private key: {e}")))?;
        encode(&Header::new(Algorithm::RS256), &self.claims(now), &key)
            .map_err(|e| FetchError::Authentication(format!("could not sign assertion: {e}")))
    }

    async fn exchange(&self, assertion: &str) -> Result<TokenResponse, FetchError> {
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)])
            .send()
            .await?;
        Ok(check_auth_response(response).await?.json().await?)
    }

    async fn session_from_assertion(&self, assertion: &str) -> Result<Session, FetchError> {
        let issued_at = Utc::now();
        let token = self.exchange(assertion).await?;

        // Same call the Earth Engine client libraries make on initialization;
        // it fails when the account is not registered for the project.
        let response = self
            .http
            .get(format!(
                "{}/v1/projects/{}/algorithms",
                self.api_url, self.key.project_id
            ))
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        check_auth_response(response).await?;

        Ok(Session {
            expires_at: token.expires_at(issued_at),
            access_token: token.access_token,
            project: self.key.project_id.clone(),
            established_at: issued_at,
        })
    }

    /// New bearer token for an established session; the project check is not repeated.
    async fn renewed_from_assertion(
        &self,
        current: &Session,
        assertion: &str,
    ) -> Result<Session, FetchError> {
        let issued_at = Utc::now();
        let token = self.exchange(assertion).await?;
        Ok(Session {
            expires_at: token.expires_at(issued_at),
            access_token: token.access_token,
            ..current.clone()
        })
    }
}

#[async_trait]
impl Authenticator for ServiceAccountAuthenticator {
    async fn authenticate(&self) -> Result<Session, FetchError> {
        tracing::info!(client_email = %self.key.client_email, "Authenticating with Earth Engine");
        let assertion = self.signed_assertion(Utc::now())?;
        self.session_from_assertion(&assertion).await
    }

    async fn refresh(&self, current: &Session) -> Result<Session, FetchError> {
        tracing::debug!(
            client_email = %self.key.client_email,
            "Renewing Earth Engine access token"
        );
        let assertion = self.signed_assertion(Utc::now())?;
        self.renewed_from_assertion(current, &assertion).await
    }
}

async fn check_auth_response(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(FetchError::Authentication(format!("{status}: {body}")))
        }
        _ => Err(FetchError::RemoteService(format!("{status}: {body}"))),
    }
}
