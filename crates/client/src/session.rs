//! A view's set of watched jobs.
//!
//! A [`MonitorSession`] owns the subscriptions of one view (one CLI
//! invocation). Jobs are independent: one job finishing or failing never
//! touches its siblings. Dropping the session cancels every job it owns.

use std::fmt;

use futures::stream::SelectAll;
use futures::StreamExt;
use serde::Serialize;
use swissknife_core::job::{Job, JobState};
use swissknife_core::types::JobId;
use tokio::sync::watch;

use crate::events::JobEvent;
use crate::monitor::{CancelHandle, MonitorError, Subscription, TaskMonitor};
use crate::submitter::JobHandle;

/// How monitoring of one job ended, when it did not end in a remote
/// terminal state.
#[derive(Debug, Clone, PartialEq)]
pub enum Interruption {
    TransportError(String),
    TimedOut,
    Cancelled,
}

struct SessionEntry {
    label: Option<String>,
    handle: CancelHandle,
    snapshot: watch::Receiver<Job>,
    interruption: Option<Interruption>,
}

impl SessionEntry {
    fn job(&self) -> Job {
        self.snapshot.borrow().clone()
    }

    fn is_settled(&self) -> bool {
        self.interruption.is_some() || self.snapshot.borrow().is_terminal()
    }
}

/// Counts of watched jobs per state, for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Monitoring stopped before a terminal state (transport error,
    /// timeout or cancel).
    pub interrupted: usize,
}

impl BatchSummary {
    /// `true` when every job reached `Succeeded`.
    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} job(s): {} succeeded, {} failed, {} processing, {} pending, {} interrupted",
            self.total, self.succeeded, self.failed, self.processing, self.pending, self.interrupted
        )
    }
}

/// The jobs watched by one view, with their notifications merged.
pub struct MonitorSession {
    monitor: TaskMonitor,
    entries: Vec<SessionEntry>,
    events: SelectAll<Subscription>,
}

impl MonitorSession {
    pub fn new(monitor: TaskMonitor) -> Self {
        Self {
            monitor,
            entries: Vec::new(),
            events: SelectAll::new(),
        }
    }

    pub fn watch(&mut self, job_id: impl Into<JobId>) -> Result<(), MonitorError> {
        self.watch_labeled(Job::pending(job_id), None)
    }

    /// Watch a submitted job, keeping its label for display.
    pub fn watch_handle(&mut self, handle: &JobHandle) -> Result<(), MonitorError> {
        self.watch_labeled(handle.job.clone(), handle.label.clone())
    }

    /// Watch `job` under `label`.
    ///
    /// An id whose earlier entry was cancelled or has settled is watched
    /// afresh, replacing that entry.
    pub fn watch_labeled(&mut self, job: Job, label: Option<String>) -> Result<(), MonitorError> {
        let stale = self.position(&job.id);
        if let Some(idx) = stale {
            let entry = &self.entries[idx];
            if !entry.handle.is_cancelled() && !entry.is_settled() {
                return Err(MonitorError::AlreadyWatched(job.id));
            }
            // Release the id in the monitor if the old stream is still queued.
            entry.handle.cancel();
        }

        let subscription = self.monitor.watch_job(job)?;
        let entry = SessionEntry {
            label,
            handle: subscription.cancel_handle(),
            snapshot: subscription.snapshot(),
            interruption: None,
        };
        match stale {
            Some(idx) => self.entries[idx] = entry,
            None => self.entries.push(entry),
        }
        self.events.push(subscription);
        Ok(())
    }

    /// Next notification from any job, or `None` when every job has
    /// settled or been cancelled. Per-job order is preserved.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        let event = self.events.next().await?;
        let interruption = match &event {
            JobEvent::TransportError { error, .. } => Some(Interruption::TransportError(error.clone())),
            JobEvent::TimedOut { .. } => Some(Interruption::TimedOut),
            _ => None,
        };
        if let Some(interruption) = interruption {
            if let Some(idx) = self.position(event.job_id()) {
                self.entries[idx].interruption = Some(interruption);
            }
        }
        Some(event)
    }

    /// Stop watching one job. Returns `false` if the job is unknown.
    pub fn cancel(&mut self, job_id: &str) -> bool {
        let Some(idx) = self.position(job_id) else {
            return false;
        };
        let entry = &mut self.entries[idx];
        if !entry.is_settled() {
            entry.interruption = Some(Interruption::Cancelled);
        }
        entry.handle.cancel();
        true
    }

    pub fn cancel_all(&mut self) {
        for entry in &mut self.entries {
            if !entry.is_settled() {
                entry.interruption = Some(Interruption::Cancelled);
            }
            entry.handle.cancel();
        }
    }

    pub fn status(&self, job_id: &str) -> Option<Job> {
        self.position(job_id).map(|idx| self.entries[idx].job())
    }

    pub fn label(&self, job_id: &str) -> Option<&str> {
        self.position(job_id)
            .and_then(|idx| self.entries[idx].label.as_deref())
    }

    pub fn interruption(&self, job_id: &str) -> Option<&Interruption> {
        self.position(job_id)
            .and_then(|idx| self.entries[idx].interruption.as_ref())
    }

    /// Records of every job in the order they were watched.
    pub fn jobs(&self) -> Vec<Job> {
        self.entries.iter().map(SessionEntry::job).collect()
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.entries.len(),
            ..BatchSummary::default()
        };
        for entry in &self.entries {
            let state = entry.snapshot.borrow().state;
            match (state, &entry.interruption) {
                (JobState::Succeeded, _) => summary.succeeded += 1,
                (JobState::Failed, _) => summary.failed += 1,
                (_, Some(_)) => summary.interrupted += 1,
                (JobState::Processing, None) => summary.processing += 1,
                (JobState::Pending, None) => summary.pending += 1,
            }
        }
        summary
    }

    /// `true` once no job can produce further notifications.
    pub fn is_settled(&self) -> bool {
        self.entries.iter().all(SessionEntry::is_settled)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, job_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.handle.job_id() == job_id)
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        for entry in &self.entries {
            entry.handle.cancel();
        }
    }
}
