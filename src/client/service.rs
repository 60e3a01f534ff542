//! Inference service HTTP client
//!
//! Provides a typed client for the liveness and prediction endpoints.
//! Every request carries its own timeout so a half-open connection to a
//! cold-starting backend can never stall a caller indefinitely.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::types::{ApiError, PredictResponse};

/// Default timeout for a single liveness probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for an image upload
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Multipart field carrying the image bytes
pub const UPLOAD_FIELD: &str = "file";

/// File name attached to the uploaded image
pub const UPLOAD_FILENAME: &str = "scan.jpg";

/// Errors that can occur when talking to the inference service
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Service responded with {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// HTTP status reported by the service, if it responded at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the request never produced an HTTP response
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Request(_))
    }
}

/// Result type for inference service operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Client for the inference service HTTP API
///
/// # Example
/// ```no_run
/// use freshscan::client::InferenceClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = InferenceClient::new("http://localhost:8000")?;
/// client.health().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InferenceClient {
    /// Base URL of the service, always ending in `/`
    base_url: Url,
    client: Client,
    probe_timeout: Duration,
    upload_timeout: Duration,
}

impl InferenceClient {
    /// Create a new client for the given base URL
    pub fn new(api_url: &str) -> ClientResult<Self> {
        Self::with_client(api_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    pub fn with_client(api_url: &str, client: Client) -> ClientResult<Self> {
        let mut base_url = Url::parse(api_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::UnsupportedScheme(base_url.scheme().to_string()));
        }
        // Url::join replaces the last path segment unless the base ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            client,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        })
    }

    /// Set the per-probe timeout
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the upload timeout
    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn upload_timeout(&self) -> Duration {
        self.upload_timeout
    }

    // =========================================================================
    // Liveness
    // =========================================================================

    /// Check that the service can respond
    ///
    /// Endpoint: GET /health, falling back to GET / when the service has no
    /// health route (404 or 405). Success is any 2xx; the body is ignored.
    pub async fn health(&self) -> ClientResult<()> {
        let status = self.probe_path("health").await?;
        if status.is_success() {
            return Ok(());
        }

        if matches!(status, StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED) {
            debug!(base_url = %self.base_url, %status, "No health route, probing service root");
            let root_status = self.probe_path("").await?;
            if root_status.is_success() {
                return Ok(());
            }
            return Err(ClientError::Status {
                status: root_status.as_u16(),
                message: "root probe failed".to_string(),
            });
        }

        Err(ClientError::Status {
            status: status.as_u16(),
            message: "health probe failed".to_string(),
        })
    }

    async fn probe_path(&self, path: &str) -> ClientResult<StatusCode> {
        let url = self.base_url.join(path)?;
        let response = self
            .client
            .get(url)
            .timeout(self.probe_timeout)
            .send()
            .await?;
        Ok(response.status())
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Upload an image and return the service's prediction
    ///
    /// Endpoint: POST /predict (multipart, one file field)
    pub async fn predict(&self, payload: Vec<u8>, content_type: &str) -> ClientResult<PredictResponse> {
        let url = self.base_url.join("predict")?;
        let size = payload.len();
        let part = Part::bytes(payload)
            .file_name(UPLOAD_FILENAME)
            .mime_str(content_type)?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        debug!(url = %url, bytes = size, content_type, "Uploading image");

        let response = self
            .client
            .post(url)
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error: ApiError = response.json().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: error.message().unwrap_or_else(|| "Unknown error".into()),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::UnexpectedResponse(e.to_string()))
    }
}
