//! Turns user requests into remote jobs.
//!
//! One call makes exactly one outbound request. There is no retry here:
//! a failed submission means no job exists and nothing should be watched.

use std::sync::Arc;

use swissknife_core::error::CoreError;
use swissknife_core::job::Job;
use swissknife_core::request::{BatchRequest, JobRequest};

use crate::api::{ApiError, ProcessingApi};

/// A freshly created remote job, seeded `Pending`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    pub job: Job,
    /// Request kind, e.g. `"media_convert"`.
    pub kind: &'static str,
    /// Display label: the uploaded filename or the source URL.
    pub label: Option<String>,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.job.id
    }
}

/// Why a submission produced no job.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// The request failed local validation; nothing was sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] CoreError),

    /// The service answered with a non-2xx status.
    #[error("Submission rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The request never got an answer (connect, DNS, timeout).
    #[error("Submission failed: {0}")]
    Transport(String),

    /// A 2xx answer without a usable task id.
    #[error("Malformed submission response: {0}")]
    MalformedResponse(String),

    /// A local file could not be read for upload.
    #[error("Could not read upload: {0}")]
    Upload(String),
}

impl SubmissionError {
    /// Human-readable reason, suitable for showing to the user as-is.
    pub fn reason(&self) -> String {
        match self {
            SubmissionError::Rejected { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ApiError> for SubmissionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Api { status, detail } => SubmissionError::Rejected { status, detail },
            ApiError::Decode(msg) => SubmissionError::MalformedResponse(msg),
            ApiError::Upload { .. } => SubmissionError::Upload(err.to_string()),
            ApiError::Request(_) | ApiError::InvalidUrl(_) => {
                SubmissionError::Transport(err.to_string())
            }
        }
    }
}

/// Creates remote jobs through a [`ProcessingApi`].
#[derive(Clone)]
pub struct Submitter {
    api: Arc<ProcessingApi>,
}

impl Submitter {
    pub fn new(api: Arc<ProcessingApi>) -> Self {
        Self { api }
    }

    /// Validate `request`, send it, and return a handle for the new job.
    pub async fn submit(&self, request: &JobRequest) -> Result<JobHandle, SubmissionError> {
        request.validate()?;

        let response = self.api.submit(request).await.map_err(|e| {
            tracing::warn!(kind = request.kind(), error = %e, "Job submission failed");
            SubmissionError::from(e)
        })?;

        let task_id = require_task_id(response.task_id)?;
        tracing::info!(
            job_id = %task_id,
            kind = request.kind(),
            endpoint = request.endpoint(),
            "Job submitted",
        );

        let label = response.original_filename.or_else(|| match request {
            JobRequest::UrlDownload { url, .. } => Some(url.trim().to_string()),
            other => other
                .upload_file()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
        });

        Ok(JobHandle {
            job: Job::pending(task_id),
            kind: request.kind(),
            label,
        })
    }

    /// Submit a batch; returns one handle per created job, in response order.
    pub async fn submit_batch(&self, batch: &BatchRequest) -> Result<Vec<JobHandle>, SubmissionError> {
        batch.validate()?;

        let response = self.api.submit_batch(batch).await.map_err(|e| {
            tracing::warn!(files = batch.files.len(), error = %e, "Batch submission failed");
            SubmissionError::from(e)
        })?;

        if response.tasks.is_empty() {
            return Err(SubmissionError::MalformedResponse(
                "batch response contained no tasks".to_string(),
            ));
        }

        let handles = response
            .tasks
            .into_iter()
            .map(|task| {
                Ok(JobHandle {
                    job: Job::pending(require_task_id(task.task_id)?),
                    kind: "batch_process",
                    label: task.filename,
                })
            })
            .collect::<Result<Vec<_>, SubmissionError>>()?;

        tracing::info!(
            jobs = handles.len(),
            action = batch.action.as_str(),
            "Batch submitted",
        );
        Ok(handles)
    }
}

fn require_task_id(task_id: String) -> Result<String, SubmissionError> {
    let trimmed = task_id.trim();
    if trimmed.is_empty() {
        return Err(SubmissionError::MalformedResponse(
            "response has an empty task_id".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
