//! REST API client for the card generation service.
//!
//! Wraps the service's HTTP endpoints (card submission, status polling,
//! banner generation, resource metadata) using [`reqwest`].  Callers get
//! typed responses or a [`CardApiError`] that keeps the status code and raw
//! body so higher layers can classify the failure.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::messages::{AssetResponse, ResourceMetadata, StatusResponse, SubmitBody, SubmitResponse};
use crate::tracker::StatusSource;

/// HTTP client for one card generation backend.
#[derive(Debug, Clone)]
pub struct CardApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum CardApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Card API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response body did not match the expected shape.
    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured base URL cannot carry path segments.
    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

impl CardApiError {
    /// HTTP status code, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) | Self::InvalidUrl(_) => None,
        }
    }

    /// Network failures, server errors, timeouts, rate limiting and
    /// malformed bodies.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) | Self::Decode(_) => true,
            Self::ApiError { status, .. } => *status >= 500 || matches!(*status, 408 | 429),
            Self::InvalidUrl(_) => false,
        }
    }
}

/// Errors from banner generation.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// The backend gave up waiting on the image engine (HTTP 503).
    #[error("Banner generation timed out")]
    TimedOut,

    /// The image engine failed (HTTP 500).
    #[error("Banner generation failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Api(CardApiError),
}

impl From<CardApiError> for AssetError {
    fn from(err: CardApiError) -> Self {
        match err {
            CardApiError::ApiError { status: 503, .. } => Self::TimedOut,
            CardApiError::ApiError { status: 500, body } => Self::Failed(body),
            other => Self::Api(other),
        }
    }
}

impl CardApi {
    /// Create an API client using the timeout and base URL from `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, CardApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config.api_url.clone()))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Base HTTP URL, e.g. `https://cards.example.com/api`.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a paid card creation request.
    ///
    /// Sends `POST /cards`.  Non-2xx responses come back as
    /// [`CardApiError::ApiError`] with the raw body so the submitter can
    /// read validation and payment details from it.
    pub async fn submit_card(&self, body: &SubmitBody<'_>) -> Result<SubmitResponse, CardApiError> {
        let response = self.client.post(self.url(&["cards"])?).json(body).send().await?;
        Self::parse_response(response).await
    }

    /// Fetch the current status of a job.
    ///
    /// Sends `GET /cards/{id}/status`.
    pub async fn job_status(&self, job_id: &str) -> Result<StatusResponse, CardApiError> {
        let response = self
            .client
            .get(self.url(&["cards", job_id, "status"])?)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Generate (or fetch the cached) banner image for a completed job.
    ///
    /// Sends `POST /cards/{id}/banner`.  A 503 means the backend timed out
    /// internally; a 500 is a generic engine failure.
    pub async fn generate_banner(&self, job_id: &str) -> Result<AssetResponse, AssetError> {
        let response = self
            .client
            .post(self.url(&["cards", job_id, "banner"])?)
            .send()
            .await
            .map_err(CardApiError::from)?;
        Ok(Self::parse_response(response).await?)
    }

    /// Fetch pricing metadata for a target resource.
    ///
    /// Sends `GET /resources/{id}/metadata`.
    pub async fn resource_metadata(
        &self,
        resource_id: &str,
    ) -> Result<ResourceMetadata, CardApiError> {
        let response = self
            .client
            .get(self.url(&["resources", resource_id, "metadata"])?)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Append `segments` to the base URL. Each segment is percent-encoded,
    /// `/`, `?` and `#` included, so an id always stays one path segment.
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, CardApiError> {
        let mut url = reqwest::Url::parse(&self.api_url)
            .map_err(|e| CardApiError::InvalidUrl(format!("{}: {e}", self.api_url)))?;
        url.path_segments_mut()
            .map_err(|()| CardApiError::InvalidUrl(format!("{} cannot be a base", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`CardApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, CardApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CardApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, CardApiError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl StatusSource for CardApi {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusResponse, CardApiError> {
        self.job_status(job_id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn url_joins_without_double_slashes() {
        let api = CardApi::with_client(reqwest::Client::new(), "http://host/api/".into());
        assert_eq!(api.url(&["cards"]).unwrap().as_str(), "http://host/api/cards");
        assert_eq!(
            api.url(&["cards", "x", "status"]).unwrap().as_str(),
            "http://host/api/cards/x/status"
        );

        let bare = CardApi::with_client(reqwest::Client::new(), "http://host".into());
        assert_eq!(bare.url(&["cards"]).unwrap().as_str(), "http://host/cards");
    }

    #[test]
    fn ids_with_reserved_characters_stay_one_segment() {
        let api = CardApi::with_client(reqwest::Client::new(), "http://host/api".into());
        assert_eq!(
            api.url(&["cards", "a#b?c", "status"]).unwrap().path(),
            "/api/cards/a%23b%3Fc/status"
        );
        assert_eq!(
            api.url(&["cards", "x/../../admin", "status"]).unwrap().path(),
            "/api/cards/x%2F..%2F..%2Fadmin/status"
        );
    }

    #[test]
    fn unparseable_base_url_is_reported() {
        let api = CardApi::with_client(reqwest::Client::new(), "not a url".into());
        assert_matches!(api.url(&["cards"]), Err(CardApiError::InvalidUrl(_)));
    }

    #[test]
    fn timeouts_and_rate_limits_are_transient() {
        for status in [408, 429] {
            assert!(CardApiError::ApiError { status, body: String::new() }.is_transient());
        }
        assert!(!CardApiError::InvalidUrl("x".into()).is_transient());
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let e500 = CardApiError::ApiError { status: 500, body: String::new() };
        let e404 = CardApiError::ApiError { status: 404, body: String::new() };
        assert!(e500.is_transient());
        assert!(!e404.is_transient());
        assert_eq!(e404.status(), Some(404));
    }

    #[test]
    fn asset_error_maps_timeout_and_failure() {
        let timeout: AssetError = CardApiError::ApiError { status: 503, body: "slow".into() }.into();
        assert_matches!(timeout, AssetError::TimedOut);

        let failed: AssetError = CardApiError::ApiError { status: 500, body: "boom".into() }.into();
        assert_matches!(failed, AssetError::Failed(body) if body == "boom");

        let other: AssetError = CardApiError::ApiError { status: 404, body: String::new() }.into();
        assert_matches!(other, AssetError::Api(_));
    }

    #[test]
    fn error_display_includes_status_and_body() {
        let err = CardApiError::ApiError { status: 502, body: "bad gateway".into() };
        assert_eq!(err.to_string(), "Card API error (502): bad gateway");
    }
}
