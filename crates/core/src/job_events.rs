//! Message type constants for job monitor events.
//!
//! Used as the `type` field of the JSON-lines output the CLI writes for
//! each notification, mirroring the lifecycle of a monitored job.

/// A job was created by the remote service.
pub const MSG_TYPE_JOB_SUBMITTED: &str = "job_submitted";

/// Non-terminal status update (pending/processing + current step).
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Job completed successfully.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Job failed on the remote side.
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// Polling itself failed; the job may still be running remotely.
pub const MSG_TYPE_JOB_TRANSPORT_ERROR: &str = "job_transport_error";

/// The service reported a status string outside the known set.
pub const MSG_TYPE_JOB_UNKNOWN_STATUS: &str = "job_unknown_status";

/// Monitoring gave up after the configured watch timeout.
pub const MSG_TYPE_JOB_TIMED_OUT: &str = "job_timed_out";

/// Monitoring was cancelled by the user.
pub const MSG_TYPE_JOB_CANCELLED: &str = "job_cancelled";

/// A result file was downloaded to disk.
pub const MSG_TYPE_JOB_DOWNLOADED: &str = "job_downloaded";
