//! OpenAI Images API client.
//!
//! Only the generation endpoint is wrapped, plus a plain download used when a
//! response carries a URL instead of inline base64 data.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("Image API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid image response: 'data' is missing or empty")]
    EmptyData,

    #[error("No usable image returned (neither base64 nor url)")]
    NoPayload,

    #[error("Invalid base64 image data: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("No base64 data and URL fallback failed: {0}")]
    FallbackDownload(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Body of `POST /images/generations`.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub quality: String,
    pub n: u32,
    pub response_format: String,
}

impl ImageRequest {
    /// A single standard-quality image returned as base64.
    pub fn b64(model: &str, prompt: &str, size: &str) -> Self {
        Self {
            model: model.to_string(),
            prompt: prompt.to_string(),
            size: size.to_string(),
            quality: "standard".to_string(),
            n: 1,
            response_format: "b64_json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagesResponse {
    #[serde(default)]
    pub data: Option<Vec<ImageData>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageData {
    #[serde(default)]
    pub b64_json: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Image generation backend.
#[async_trait]
pub trait ImageClient: Send + Sync {
    async fn generate(&self, request: &ImageRequest) -> Result<ImagesResponse, ImageError>;

    /// Fetch raw bytes from a URL returned by `generate`.
    async fn download(&self, url: &str) -> Result<Vec<u8>, ImageError>;
}

/// OpenAI implementation of [`ImageClient`].
pub struct OpenAiImageClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiImageClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl ImageClient for OpenAiImageClient {
    async fn generate(&self, request: &ImageRequest) -> Result<ImagesResponse, ImageError> {
        let api_key = self.api_key.as_deref().ok_or(ImageError::MissingApiKey)?;
        let url = format!("{}/images/generations", self.base_url);

        tracing::debug!(
            "Requesting image from {} (model={}, size={})",
            url,
            request.model,
            request.size
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(ImageError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let response = self
            .client
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }
}
