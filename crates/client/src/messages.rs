//! Wire types exchanged with the processing service.
//!
//! Responses are deserialized leniently: optional fields may be absent or
//! `null`, and unknown fields are ignored. The status string of a task is
//! normalised into [`StatusReport`] before the monitor sees it.

use serde::{Deserialize, Serialize};
use swissknife_core::job::{JobState, Observation};

/// Fallback message when an error response carries no usable `detail`.
pub const GENERIC_API_ERROR: &str = "API request failed";

/// Response to a job-creating `POST`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub original_filename: Option<String>,
}

/// Response to `POST /visual/batch-process`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchSubmitResponse {
    pub tasks: Vec<BatchTaskRef>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchTaskRef {
    pub task_id: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Response to `GET /tasks/{task_id}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub task_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Usually a string, but the service passes through whatever the
    /// worker raised.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// A status response after normalisation.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    Known(Observation),
    /// The service reported a status string outside the known set.
    Unknown { raw: String, step: Option<String> },
}

impl TaskStatusResponse {
    /// Convenience constructor, mostly for fakes and tests.
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn into_report(self) -> StatusReport {
        let error = self.error_message();
        match JobState::from_wire(&self.status) {
            Some(state) => StatusReport::Known(Observation {
                state,
                step: self.step,
                result: self.result,
                error,
            }),
            None => StatusReport::Unknown {
                raw: self.status,
                step: self.step,
            },
        }
    }
}

/// Response of the synchronous text tools.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextToolResponse {
    pub status: String,
    /// Inline output (formatted JSON, base64, diff, HTML).
    #[serde(default)]
    pub data: Option<String>,
    /// Server-side output file, fetched through `/download/{filename}`.
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// Extract the human-readable message from an error response body.
///
/// Uses `detail` when it is a string, and [`GENERIC_API_ERROR`] for
/// anything else (validation arrays, HTML error pages, empty bodies).
pub fn error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| match b.detail {
            Some(serde_json::Value::String(detail)) => Some(detail),
            _ => None,
        })
        .unwrap_or_else(|| GENERIC_API_ERROR.to_string())
}
