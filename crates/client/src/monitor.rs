//! Task monitor: polls remote jobs until they reach a terminal state.
//!
//! Every [`TaskMonitor::watch`] spawns one polling task that owns the
//! job's state, its timer and the sending half of the subscription's
//! event channel. The task polls immediately, then once per
//! `poll_interval`, issuing at most one status request at a time. A tick
//! that fires while a request is in flight is skipped, not queued.
//!
//! The task stops on the first terminal observation, on a transport
//! failure (no retry), on timeout, or when its [`CancellationToken`] fires.
//! Each subscription holds a child token of the monitor's root token, so
//! [`TaskMonitor::shutdown`] stops every poller at once.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{FutureExt, Stream, StreamExt};
use swissknife_core::job::Job;
use swissknife_core::types::JobId;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, ProcessingApi};
use crate::events::JobEvent;
use crate::messages::{StatusReport, TaskStatusResponse};

/// Default delay between two polls of the same job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Lower bound applied to the configured poll interval.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Status source
// ---------------------------------------------------------------------------

/// Where the monitor reads job status from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch the current status of one job. An `Err` is a transport
    /// failure and ends the subscription.
    async fn fetch_status(&self, job_id: &str) -> Result<TaskStatusResponse, ApiError>;
}

#[async_trait]
impl StatusSource for ProcessingApi {
    async fn fetch_status(&self, job_id: &str) -> Result<TaskStatusResponse, ApiError> {
        self.get_task(job_id).await
    }
}

// ---------------------------------------------------------------------------
// Configuration and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Deliver [`JobEvent::TimedOut`] once a watch has run this long.
    pub watch_timeout: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            watch_timeout: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// A live subscription for this job already exists in this monitor.
    #[error("Job {0} is already being watched")]
    AlreadyWatched(JobId),

    /// The job is already `Succeeded` or `Failed`; there is nothing to poll.
    #[error("Job {0} has already finished")]
    AlreadyFinished(JobId),

    #[error("Job id must not be empty")]
    EmptyJobId,

    /// [`TaskMonitor::shutdown`] was called.
    #[error("Task monitor has been shut down")]
    ShutDown,
}

// ---------------------------------------------------------------------------
// TaskMonitor
// ---------------------------------------------------------------------------

struct Registration {
    generation: u64,
    snapshot: watch::Receiver<Job>,
}

struct MonitorInner {
    source: Arc<dyn StatusSource>,
    config: MonitorConfig,
    /// Live subscriptions by job id. A std lock: it is only held for map
    /// operations and must be usable from `Drop`.
    registry: RwLock<HashMap<JobId, Registration>>,
    next_generation: AtomicU64,
    root: CancellationToken,
}

impl MonitorInner {
    /// Remove the registration for `job_id` if it still belongs to
    /// `generation`. A newer watch of the same id is left alone.
    fn unregister(&self, job_id: &str, generation: u64) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry
            .get(job_id)
            .is_some_and(|r| r.generation == generation)
        {
            registry.remove(job_id);
        }
    }
}

/// Watches remote jobs. Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct TaskMonitor {
    inner: Arc<MonitorInner>,
}

impl TaskMonitor {
    pub fn new(source: Arc<dyn StatusSource>, config: MonitorConfig) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                source,
                config,
                registry: RwLock::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                root: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Start watching a freshly submitted job.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch(&self, job_id: impl Into<JobId>) -> Result<Subscription, MonitorError> {
        self.watch_job(Job::pending(job_id))
    }

    /// Start watching from an existing record, e.g. a [`JobHandle`]'s job.
    ///
    /// [`JobHandle`]: crate::submitter::JobHandle
    pub fn watch_job(&self, job: Job) -> Result<Subscription, MonitorError> {
        if job.id.trim().is_empty() {
            return Err(MonitorError::EmptyJobId);
        }
        if job.is_terminal() {
            return Err(MonitorError::AlreadyFinished(job.id));
        }
        if self.inner.root.is_cancelled() {
            return Err(MonitorError::ShutDown);
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (snapshot_tx, snapshot_rx) = watch::channel(job.clone());

        {
            let mut registry = self
                .inner
                .registry
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if registry.contains_key(&job.id) {
                return Err(MonitorError::AlreadyWatched(job.id));
            }
            registry.insert(
                job.id.clone(),
                Registration {
                    generation,
                    snapshot: snapshot_rx.clone(),
                },
            );
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let token = self.inner.root.child_token();
        let handle = CancelHandle {
            job_id: job.id.clone(),
            generation,
            token: token.clone(),
            monitor: Arc::clone(&self.inner),
        };

        tracing::debug!(job_id = %job.id, "Watching job");

        let poller = Poller {
            job,
            source: Arc::clone(&self.inner.source),
            config: self.inner.config.clone(),
            events: events_tx,
            snapshot: snapshot_tx,
            cancel: token,
        };
        tokio::spawn(poller.run());

        Ok(Subscription {
            handle,
            events: events_rx,
            snapshot: snapshot_rx,
        })
    }

    /// Last known record of a watched job, stale by at most one interval.
    ///
    /// Returns `None` once the job's subscription has been cancelled or
    /// dropped.
    pub fn status(&self, job_id: &str) -> Option<Job> {
        let registry = self
            .inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        registry.get(job_id).map(|r| r.snapshot.borrow().clone())
    }

    pub fn is_watching(&self, job_id: &str) -> bool {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(job_id)
    }

    pub fn watched_count(&self) -> usize {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Cancel every subscription and refuse new watches.
    pub fn shutdown(&self) {
        self.inner.root.cancel();
        let mut registry = self
            .inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let count = registry.len();
        registry.clear();
        tracing::info!(jobs = count, "Task monitor shut down");
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Cancels one subscription. Clones refer to the same subscription.
#[derive(Clone)]
pub struct CancelHandle {
    job_id: JobId,
    generation: u64,
    token: CancellationToken,
    monitor: Arc<MonitorInner>,
}

impl CancelHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Stop polling now. Idempotent; valid in any state.
    ///
    /// A poll in flight is abandoned and its result discarded.
    pub fn cancel(&self) {
        let first = !self.token.is_cancelled();
        self.token.cancel();
        self.monitor.unregister(&self.job_id, self.generation);
        if first {
            tracing::debug!(job_id = %self.job_id, "Subscription cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Receiving end of one watched job.
///
/// Yields one [`JobEvent`] per completed poll, in completion order, and
/// ends after the terminal event. Nothing is yielded once
/// [`cancel`](Self::cancel) has returned. Dropping the subscription
/// cancels it.
pub struct Subscription {
    handle: CancelHandle,
    events: mpsc::UnboundedReceiver<JobEvent>,
    snapshot: watch::Receiver<Job>,
}

impl Subscription {
    pub fn job_id(&self) -> &str {
        self.handle.job_id()
    }

    /// Last known record of the job.
    pub fn status(&self) -> Job {
        self.snapshot.borrow().clone()
    }

    /// A receiver that keeps tracking the job record.
    pub fn snapshot(&self) -> watch::Receiver<Job> {
        self.snapshot.clone()
    }

    /// Next notification, or `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.next().await
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("job_id", &self.handle.job_id)
            .field("cancelled", &self.handle.is_cancelled())
            .finish()
    }
}

impl Stream for Subscription {
    type Item = JobEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<JobEvent>> {
        if self.handle.is_cancelled() {
            return Poll::Ready(None);
        }
        match self.events.poll_recv(cx) {
            // The poller may have sent just before a cancel from another task.
            Poll::Ready(Some(_)) if self.handle.is_cancelled() => Poll::Ready(None),
            other => other,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

// ---------------------------------------------------------------------------
// Poller task
// ---------------------------------------------------------------------------

struct Poller {
    job: Job,
    source: Arc<dyn StatusSource>,
    config: MonitorConfig,
    events: mpsc::UnboundedSender<JobEvent>,
    snapshot: watch::Sender<Job>,
    cancel: CancellationToken,
}

impl Poller {
    async fn run(mut self) {
        let job_id = self.job.id.clone();
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Some(limit) = self.config.watch_timeout {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    tracing::warn!(
                        job_id = %job_id,
                        elapsed_secs = elapsed.as_secs(),
                        "Watch timeout elapsed, giving up",
                    );
                    self.deliver(JobEvent::TimedOut {
                        job_id: job_id.clone(),
                        elapsed,
                    });
                    break;
                }
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(job_id = %job_id, "Cancelled with a poll in flight");
                    break;
                }
                outcome = self.source.fetch_status(&job_id) => outcome,
            };

            let event = match outcome {
                Ok(response) => match self.apply(response) {
                    Some(event) => event,
                    None => break,
                },
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Status poll failed, stopping");
                    JobEvent::TransportError {
                        job_id: job_id.clone(),
                        error: e.to_string(),
                    }
                }
            };

            let terminal = event.is_terminal();
            if !self.deliver(event) || terminal {
                break;
            }

            // Drop a tick that came due while the poll was in flight.
            let _ = ticker.tick().now_or_never();
        }

        tracing::debug!(job_id = %job_id, state = %self.job.state, "Poller stopped");
    }

    /// Fold one status response into the job and build its notification.
    fn apply(&mut self, response: TaskStatusResponse) -> Option<JobEvent> {
        let now = Utc::now();
        match response.into_report() {
            StatusReport::Known(observation) => {
                let reported = observation.state;
                let state = match self.job.observe(observation, now) {
                    Ok(state) => state,
                    Err(e) => {
                        tracing::error!(job_id = %self.job.id, error = %e, "Poll after terminal state");
                        return None;
                    }
                };

                if state != reported {
                    tracing::warn!(
                        job_id = %self.job.id,
                        reported = %reported,
                        kept = %state,
                        "Ignoring status regression",
                    );
                } else if state.is_terminal() {
                    tracing::info!(job_id = %self.job.id, state = %state, "Job finished");
                } else {
                    tracing::debug!(
                        job_id = %self.job.id,
                        state = %state,
                        step = ?self.job.step,
                        "Job progress",
                    );
                }

                self.snapshot.send_replace(self.job.clone());
                Some(JobEvent::for_job(self.job.clone()))
            }
            StatusReport::Unknown { raw, step } => {
                tracing::warn!(job_id = %self.job.id, status = %raw, "Unknown job status, still polling");
                self.job.touch(now);
                self.snapshot.send_replace(self.job.clone());
                Some(JobEvent::UnknownStatus {
                    job_id: self.job.id.clone(),
                    raw_status: raw,
                    step,
                })
            }
        }
    }

    /// Returns `false` when the subscription is cancelled or gone.
    fn deliver(&self, event: JobEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.events.send(event).is_ok()
    }
}
