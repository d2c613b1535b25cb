//! HTTP client for the remote colorization service.
//!
//! Wraps job creation, status lookup, the synchronous "ephemeral" endpoint
//! and result download using [`reqwest`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use strum::Display;

use crate::models::image::{ImageError, ImageUpload};
use crate::models::job::{ErrorBody, JobHandle, JobStatus, MalformedStatus, StatusResponse, UploadResponse};
use crate::models::stats::StatsResponse;
use crate::services::identity::IdentityProvider;
use crate::services::poller::StatusSource;

/// Client for the colorization service REST API.
pub struct ColorizationApi {
    http: Client,
    base_url: String,
    identity: Arc<dyn IdentityProvider>,
}

#[derive(Deserialize)]
struct EphemeralResponse {
    original_base64: String,
    colorized_base64: String,
    #[serde(default)]
    expires_in: u64,
}

/// Both images of a synchronous colorization, already decoded.
#[derive(Debug, Clone)]
pub struct EphemeralResult {
    pub original: Vec<u8>,
    pub colorized: Vec<u8>,
    /// Seconds the service keeps its copy around.
    pub expires_in: u64,
}

/// Client platform reported to the ephemeral endpoint. The service only
/// knows these three values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` value; desktop targets report as `web`.
    pub fn from_os(os: &str) -> Self {
        match os {
            "ios" => Platform::Ios,
            "android" => Platform::Android,
            _ => Platform::Web,
        }
    }
}

impl ColorizationApi {
    pub fn new(
        base_url: &str,
        identity: Arc<dyn IdentityProvider>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("colorize-client/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()?;

        Ok(Self::with_client(http, base_url, identity))
    }

    /// Reuse an existing [`reqwest::Client`] (connection pool, custom TLS, etc.).
    pub fn with_client(http: Client, base_url: &str, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
        }
    }

    /// Upload an image and create a colorization job.
    ///
    /// No retry happens here; a failed submission is reported as-is and the
    /// caller decides whether to submit again.
    pub async fn submit(&self, image: &ImageUpload) -> Result<JobHandle, SubmissionError> {
        let url = format!("{}/api/v1/colorize/upload", self.base_url);
        let form = self.image_form(image).await?;

        metrics::counter!("colorize_submissions_total").increment(1);

        let result = self.create_job(&url, form, image).await;

        match &result {
            Ok(handle) => tracing::info!(
                request_id = %handle.request_id,
                file_name = %image.file_name,
                content_type = image.content_type,
                size_bytes = image.bytes.len(),
                "Colorization job submitted"
            ),
            Err(e) => {
                metrics::counter!("colorize_submission_failures_total").increment(1);
                tracing::warn!(file_name = %image.file_name, error = %e, "Colorization job submission failed");
            }
        }

        result
    }

    async fn create_job(&self, url: &str, form: Form, image: &ImageUpload) -> Result<JobHandle, SubmissionError> {
        let response = self.authorize(self.http.post(url)).await.multipart(form).send().await?;
        let response = ensure_success(response, "Upload").await?;
        let body: UploadResponse = response.json().await?;

        let request_id = body
            .request_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(SubmissionError::MissingRequestId)?;

        Ok(JobHandle {
            request_id,
            original_ref: body
                .original_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| image.source_ref.clone()),
        })
    }

    /// Query the current status of a job.
    pub async fn get_status(&self, request_id: &str) -> Result<JobStatus, StatusError> {
        let url = format!("{}/api/v1/colorize/status/{}", self.base_url, request_id);

        let response = self.authorize(self.http.get(&url)).await.send().await?;
        let response = ensure_success(response, "Status check").await?;
        let body: StatusResponse = response.json().await?;

        tracing::debug!(request_id, status = %body.status, "Status received");

        Ok(JobStatus::try_from(body)?)
    }

    /// Colorize an image in a single request. Nothing is persisted server-side
    /// beyond `expires_in`, so there is no job to poll.
    pub async fn colorize_ephemeral(&self, image: &ImageUpload) -> Result<EphemeralResult, SubmissionError> {
        let url = format!("{}/api/v1/colorize/ephemeral", self.base_url);
        let form = self
            .image_form(image)
            .await?
            .text("platform", Platform::current().to_string());

        metrics::counter!("colorize_submissions_total").increment(1);

        let response = self.authorize(self.http.post(&url)).await.multipart(form).send().await?;
        let response = ensure_success(response, "Colorization").await?;
        let body: EphemeralResponse = response.json().await?;

        let engine = base64::engine::general_purpose::STANDARD;
        let result = EphemeralResult {
            original: engine.decode(body.original_base64.trim())?,
            colorized: engine.decode(body.colorized_base64.trim())?,
            expires_in: body.expires_in,
        };

        tracing::info!(
            file_name = %image.file_name,
            colorized_bytes = result.colorized.len(),
            expires_in = result.expires_in,
            "Ephemeral colorization complete"
        );

        Ok(result)
    }

    /// Public usage counters. Never fails: any error is logged and the
    /// placeholder counters are returned instead.
    pub async fn stats(&self) -> StatsResponse {
        match self.fetch_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch stats, using fallback values");
                StatsResponse::fallback()
            }
        }
    }

    async fn fetch_stats(&self) -> Result<StatsResponse, RemoteError> {
        let url = format!("{}/api/v1/stats/", self.base_url);
        let response = self.http.get(&url).send().await?;
        let response = ensure_success(response, "Stats").await?;
        Ok(response.json().await?)
    }

    /// Download a result image by locator.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let response = self.http.get(url).send().await?;
        let response = ensure_success(response, "Download").await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.identity.bearer_credential().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn image_form(&self, image: &ImageUpload) -> Result<Form, SubmissionError> {
        if image.bytes.is_empty() {
            return Err(ImageError::Empty.into());
        }

        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(image.content_type)?;

        let mut form = Form::new().part("file", part);
        if let Some(user) = self.identity.current_user().await {
            form = form.text("user_id", user.id);
            form = form.text("user_email", user.email.unwrap_or_default());
        }

        Ok(form)
    }
}

#[async_trait]
impl StatusSource for ColorizationApi {
    async fn fetch_status(&self, request_id: &str) -> Result<JobStatus, StatusError> {
        self.get_status(request_id).await
    }
}

/// Return the response unchanged on a 2xx status, otherwise turn the body
/// into a [`RemoteError::Rejected`], preferring the service's `detail`.
async fn ensure_success(response: Response, operation: &str) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.message())
        .unwrap_or_else(|| format!("{operation} failed: {}", status.as_u16()));

    Err(RemoteError::Rejected {
        status: status.as_u16(),
        message,
    })
}

/// Transport or HTTP-level failure talking to the service.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-2xx status.
    #[error("{message}")]
    Rejected { status: u16, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    InvalidImage(#[from] ImageError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Upload response did not include a request_id")]
    MissingRequestId,

    #[error("Colorized image data could not be decoded: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl From<reqwest::Error> for SubmissionError {
    fn from(e: reqwest::Error) -> Self {
        SubmissionError::Remote(RemoteError::Http(e))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Malformed status response: {0}")]
    Malformed(#[from] MalformedStatus),
}

impl From<reqwest::Error> for StatusError {
    fn from(e: reqwest::Error) -> Self {
        StatusError::Remote(RemoteError::Http(e))
    }
}
