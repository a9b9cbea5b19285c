//! Notifications delivered by the task monitor.

use std::time::Duration;

use swissknife_core::job::{Job, JobState};
use swissknife_core::job_events::{
    MSG_TYPE_JOB_COMPLETED, MSG_TYPE_JOB_FAILED, MSG_TYPE_JOB_PROGRESS, MSG_TYPE_JOB_TIMED_OUT,
    MSG_TYPE_JOB_TRANSPORT_ERROR, MSG_TYPE_JOB_UNKNOWN_STATUS,
};
use swissknife_core::types::JobId;

/// One notification per completed poll of a watched job.
///
/// `Succeeded`, `Failed`, `TransportError` and `TimedOut` are terminal:
/// nothing further is ever delivered on the same subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// The job is still `Pending` or `Processing`.
    Progress { job: Job },

    /// The job finished; `job.result` holds the payload.
    Succeeded { job: Job },

    /// The job failed remotely; `job.error` holds the message.
    Failed { job: Job },

    /// A status poll could not complete. Polling stops without retrying.
    TransportError { job_id: JobId, error: String },

    /// The service reported a status string outside the known set.
    /// Polling continues.
    UnknownStatus {
        job_id: JobId,
        raw_status: String,
        step: Option<String>,
    },

    /// The watch timeout elapsed before the job finished.
    TimedOut { job_id: JobId, elapsed: Duration },
}

impl JobEvent {
    /// Event reflecting the job's state after a successful observation.
    pub fn for_job(job: Job) -> Self {
        match job.state {
            JobState::Succeeded => JobEvent::Succeeded { job },
            JobState::Failed => JobEvent::Failed { job },
            JobState::Pending | JobState::Processing => JobEvent::Progress { job },
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Progress { job } | JobEvent::Succeeded { job } | JobEvent::Failed { job } => {
                &job.id
            }
            JobEvent::TransportError { job_id, .. }
            | JobEvent::UnknownStatus { job_id, .. }
            | JobEvent::TimedOut { job_id, .. } => job_id,
        }
    }

    /// The job snapshot carried by the event, if any.
    pub fn job(&self) -> Option<&Job> {
        match self {
            JobEvent::Progress { job } | JobEvent::Succeeded { job } | JobEvent::Failed { job } => {
                Some(job)
            }
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            JobEvent::Progress { .. } | JobEvent::UnknownStatus { .. }
        )
    }

    /// Message type tag used when rendering the event as JSON.
    pub fn message_type(&self) -> &'static str {
        match self {
            JobEvent::Progress { .. } => MSG_TYPE_JOB_PROGRESS,
            JobEvent::Succeeded { .. } => MSG_TYPE_JOB_COMPLETED,
            JobEvent::Failed { .. } => MSG_TYPE_JOB_FAILED,
            JobEvent::TransportError { .. } => MSG_TYPE_JOB_TRANSPORT_ERROR,
            JobEvent::UnknownStatus { .. } => MSG_TYPE_JOB_UNKNOWN_STATUS,
            JobEvent::TimedOut { .. } => MSG_TYPE_JOB_TIMED_OUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use swissknife_core::job::Observation;

    use super::*;

    #[test]
    fn for_job_follows_state() {
        let mut job = Job::pending("t1");
        assert!(matches!(JobEvent::for_job(job.clone()), JobEvent::Progress { .. }));

        job.observe(Observation::new(JobState::Failed).with_error("bad input"), Utc::now())
            .unwrap();
        let event = JobEvent::for_job(job);
        assert!(event.is_terminal());
        assert_eq!(event.message_type(), MSG_TYPE_JOB_FAILED);
        assert_eq!(event.job_id(), "t1");
    }

    #[test]
    fn unknown_status_is_not_terminal() {
        let event = JobEvent::UnknownStatus {
            job_id: "t1".into(),
            raw_status: "RETRY".into(),
            step: None,
        };
        assert!(!event.is_terminal());
        assert!(event.job().is_none());
    }

    #[test]
    fn transport_error_is_terminal() {
        let event = JobEvent::TransportError {
            job_id: "t1".into(),
            error: "connection refused".into(),
        };
        assert!(event.is_terminal());
        assert_eq!(event.message_type(), MSG_TYPE_JOB_TRANSPORT_ERROR);
    }
}
