//! Job record and its lifecycle state machine.
//!
//! A job moves `Pending -> Processing -> {Succeeded, Failed}`. It may jump
//! straight from `Pending` to a terminal state when the remote service
//! finishes before the first poll. Terminal states are absorbing: once a
//! job is `Succeeded` or `Failed`, [`Job::observe`] refuses any further
//! observation.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Wire status constants
// ---------------------------------------------------------------------------

/// Job accepted by the service, not yet picked up by a worker.
pub const STATUS_PENDING: &str = "PENDING";
/// A worker is executing the job.
pub const STATUS_PROCESSING: &str = "PROCESSING";
/// Job finished and produced a result.
pub const STATUS_SUCCESS: &str = "SUCCESS";
/// Job finished with an error.
pub const STATUS_FAILURE: &str = "FAILURE";

/// All status strings the service is known to report.
pub const VALID_STATUSES: &[&str] = &[
    STATUS_PENDING,
    STATUS_PROCESSING,
    STATUS_SUCCESS,
    STATUS_FAILURE,
];

/// Message stored on a failed job when the service sent no error text.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Job failed without an error message";

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Canonical lifecycle state of a remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl JobState {
    /// `true` for `Succeeded` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Normalise a wire status string into a state.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Returns `None` for anything outside [`VALID_STATUSES`].
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            STATUS_PENDING => Some(JobState::Pending),
            STATUS_PROCESSING => Some(JobState::Processing),
            STATUS_SUCCESS => Some(JobState::Succeeded),
            STATUS_FAILURE => Some(JobState::Failed),
            _ => None,
        }
    }

    /// The status string the service uses for this state.
    pub fn as_wire(self) -> &'static str {
        match self {
            JobState::Pending => STATUS_PENDING,
            JobState::Processing => STATUS_PROCESSING,
            JobState::Succeeded => STATUS_SUCCESS,
            JobState::Failed => STATUS_FAILURE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// One normalised status report, as returned by a single poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub state: JobState,
    pub step: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Observation {
    /// A bare observation carrying only a state.
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            step: None,
            result: None,
            error: None,
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Last known record of one remote unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    /// Advisory progress label, e.g. `"converting"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Present only when `state` is `Succeeded`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Present only when `state` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub last_polled_at: Option<Timestamp>,
}

impl Job {
    /// A freshly submitted job, seeded to `Pending`.
    pub fn pending(id: impl Into<JobId>) -> Self {
        Self {
            id: id.into(),
            state: JobState::Pending,
            step: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            last_polled_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply a poll observation taken at `at`.
    ///
    /// Returns the state the job is in afterwards. A `Pending` report on a
    /// job already seen `Processing` does not move it backwards; the
    /// returned state then differs from `obs.state`. Result and error are
    /// kept only in the terminal state they belong to.
    pub fn observe(&mut self, obs: Observation, at: Timestamp) -> Result<JobState, CoreError> {
        if self.state.is_terminal() {
            return Err(CoreError::InvalidTransition {
                job_id: self.id.clone(),
                from: self.state,
                to: obs.state,
            });
        }

        let next = match (self.state, obs.state) {
            (JobState::Processing, JobState::Pending) => JobState::Processing,
            (_, observed) => observed,
        };

        match next {
            JobState::Succeeded => {
                self.result = obs.result;
                self.error = None;
            }
            JobState::Failed => {
                self.result = None;
                self.error = Some(
                    obs.error
                        .filter(|msg| !msg.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
                );
            }
            JobState::Pending | JobState::Processing => {
                self.result = None;
                self.error = None;
            }
        }

        self.step = obs.step;
        self.state = next;
        self.last_polled_at = Some(at);
        Ok(next)
    }

    /// Record a poll that returned no usable state.
    pub fn touch(&mut self, at: Timestamp) {
        self.last_polled_at = Some(at);
    }

    /// The output file name, for jobs whose result is a downloadable file.
    pub fn result_filename(&self) -> Option<&str> {
        self.result.as_ref()?.get("filename")?.as_str()
    }

    /// The extracted text, for OCR jobs.
    pub fn result_text(&self) -> Option<&str> {
        self.result.as_ref()?.get("text")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn from_wire_is_case_insensitive() {
        assert_eq!(JobState::from_wire("PENDING"), Some(JobState::Pending));
        assert_eq!(JobState::from_wire("processing"), Some(JobState::Processing));
        assert_eq!(JobState::from_wire(" Success "), Some(JobState::Succeeded));
        assert_eq!(JobState::from_wire("failure"), Some(JobState::Failed));
    }

    #[test]
    fn from_wire_rejects_unknown_strings() {
        assert_eq!(JobState::from_wire("STARTED"), None);
        assert_eq!(JobState::from_wire(""), None);
    }

    #[test]
    fn wire_names_round_trip() {
        for raw in VALID_STATUSES {
            let state = JobState::from_wire(raw).unwrap();
            assert_eq!(state.as_wire(), *raw);
        }
    }

    #[test]
    fn only_succeeded_and_failed_are_terminal() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Processing.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn new_job_is_pending() {
        let job = Job::pending("abc");
        assert_eq!(job.state, JobState::Pending);
        assert!(job.last_polled_at.is_none());
        assert!(job.result.is_none());
    }

    #[test]
    fn pending_may_jump_straight_to_succeeded() {
        let mut job = Job::pending("abc");
        let state = job
            .observe(
                Observation::new(JobState::Succeeded).with_result(json!({"filename": "out.mp4"})),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(state, JobState::Succeeded);
        assert_eq!(job.result_filename(), Some("out.mp4"));
        assert!(job.last_polled_at.is_some());
    }

    #[test]
    fn terminal_state_is_absorbing() {
        let mut job = Job::pending("abc");
        job.observe(Observation::new(JobState::Failed).with_error("boom"), Utc::now())
            .unwrap();

        let err = job
            .observe(Observation::new(JobState::Processing), Utc::now())
            .unwrap_err();
        assert_matches!(
            err,
            CoreError::InvalidTransition {
                from: JobState::Failed,
                to: JobState::Processing,
                ..
            }
        );
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn processing_does_not_regress_to_pending() {
        let mut job = Job::pending("abc");
        job.observe(Observation::new(JobState::Processing), Utc::now())
            .unwrap();
        let state = job
            .observe(Observation::new(JobState::Pending), Utc::now())
            .unwrap();
        assert_eq!(state, JobState::Processing);
        assert_eq!(job.state, JobState::Processing);
    }

    #[test]
    fn failure_without_message_gets_default() {
        let mut job = Job::pending("abc");
        job.observe(Observation::new(JobState::Failed).with_error("  "), Utc::now())
            .unwrap();
        assert_eq!(job.error.as_deref(), Some(DEFAULT_FAILURE_MESSAGE));
    }

    #[test]
    fn non_terminal_observation_drops_result_and_error() {
        let mut job = Job::pending("abc");
        job.observe(
            Observation::new(JobState::Processing)
                .with_step("encoding")
                .with_result(json!({"partial": true}))
                .with_error("not yet"),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(job.step.as_deref(), Some("encoding"));
        assert!(job.result.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn result_text_reads_ocr_output() {
        let mut job = Job::pending("abc");
        job.observe(
            Observation::new(JobState::Succeeded)
                .with_result(json!({"status": "success", "text": "hello", "lang": "eng"})),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(job.result_text(), Some("hello"));
        assert_eq!(job.result_filename(), None);
    }
}
