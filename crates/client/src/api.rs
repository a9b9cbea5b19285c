//! REST API client for the processing service.
//!
//! Wraps job submission, task status lookup, result download and the
//! synchronous text tools using [`reqwest`].

use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use swissknife_core::request::{BatchRequest, JobRequest, RequestBody, BATCH_FILES_FIELD, FILE_FIELD};
use swissknife_core::text::TextRequest;

use crate::config::ClientConfig;
use crate::messages::{
    error_detail, BatchSubmitResponse, SubmitResponse, TaskStatusResponse, TextToolResponse,
};

/// HTTP client for one processing service deployment.
pub struct ProcessingApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (connect, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-2xx status code.
    #[error("API error ({status}): {detail}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// The `detail` message of the error body, or a generic fallback.
        detail: String,
    },

    /// A 2xx response whose body did not match the expected shape.
    #[error("Unexpected response body: {0}")]
    Decode(String),

    /// The base URL or a path segment could not form a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A local file to upload could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Upload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessingApi {
    /// Create a client with default reqwest settings.
    ///
    /// * `api_url` - Base URL, e.g. `http://localhost:8000/api/v1`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        let api_url = api_url.trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    /// Build a client honouring the configured request timeout.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config.api_url.clone()))
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Create a remote job.
    ///
    /// Uploads go out as multipart with the file under `file`; URL
    /// downloads are posted as JSON. Returns the service-assigned task id.
    pub async fn submit(&self, request: &JobRequest) -> Result<SubmitResponse, ApiError> {
        let builder = self.client.post(self.url(request.endpoint()));

        let builder = match request.body() {
            RequestBody::Multipart { file, fields } => {
                let mut form = Form::new().part(FILE_FIELD, Self::file_part(file).await?);
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                builder.multipart(form)
            }
            RequestBody::Json(body) => builder.json(&body),
        };

        let response = builder.send().await?;
        Self::parse_response(response).await
    }

    /// Create one remote job per file with a single multipart request.
    pub async fn submit_batch(&self, batch: &BatchRequest) -> Result<BatchSubmitResponse, ApiError> {
        let mut form = Form::new();
        for path in &batch.files {
            form = form.part(BATCH_FILES_FIELD, Self::file_part(path).await?);
        }
        for (name, value) in batch.fields() {
            form = form.text(name, value);
        }

        let response = self
            .client
            .post(self.url(batch.endpoint()))
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the current status of a task via `GET /tasks/{task_id}`.
    pub async fn get_task(&self, task_id: &str) -> Result<TaskStatusResponse, ApiError> {
        let url = self.url_with_segments(&["tasks", task_id])?;
        let response = self.client.get(url).send().await?;
        Self::parse_response(response).await
    }

    /// Download a result file via `GET /download/{filename}`.
    ///
    /// The filename is percent-encoded as a single path segment.
    pub async fn download(&self, filename: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.url_with_segments(&["download", filename])?;
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Run one of the synchronous text tools.
    pub async fn run_text_tool(&self, request: &TextRequest) -> Result<TextToolResponse, ApiError> {
        let response = self
            .client
            .post(self.url(request.endpoint()))
            .json(&request.body())
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn url_with_segments(&self, segments: &[&str]) -> Result<reqwest::Url, ApiError> {
        let mut url = reqwest::Url::parse(&self.api_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", self.api_url)))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidUrl(format!("{} cannot be a base", self.api_url)))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn file_part(path: &Path) -> Result<Part, ApiError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Upload {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Part::bytes(bytes).file_name(name))
    }

    /// Ensure the response has a success status code. On failure the
    /// body's `detail` becomes the error message.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Api {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}
