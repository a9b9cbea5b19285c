//! Shared fixtures for the client integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use swissknife_client::api::ApiError;
use swissknife_client::messages::TaskStatusResponse;
use swissknife_client::monitor::StatusSource;
use tokio::sync::Notify;
use tokio::time::Instant;

/// What the scripted source answers to one poll.
pub enum Reply {
    Status(TaskStatusResponse),
    /// A poll that cannot complete.
    Fail(String),
    /// Answer after a delay.
    Slow(Duration, TaskStatusResponse),
    /// Answer once the notify fires.
    Hold(Arc<Notify>, TaskStatusResponse),
}

/// In-memory [`StatusSource`] answering from a per-job script.
///
/// When a job's script runs out every further poll reports `PROCESSING`.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, job_id: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(job_id.to_string(), replies.into());
    }

    /// Number of polls issued for `job_id`.
    pub fn calls(&self, job_id: &str) -> usize {
        self.call_times(job_id).len()
    }

    pub fn call_times(&self, job_id: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, at)| *at)
            .collect()
    }

    /// Highest number of polls that were outstanding at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn fetch_status(&self, job_id: &str) -> Result<TaskStatusResponse, ApiError> {
        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Reply::Status(processing(None)));

        self.calls
            .lock()
            .unwrap()
            .push((job_id.to_string(), Instant::now()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match reply {
            Reply::Status(response) => Ok(response),
            Reply::Fail(detail) => Err(ApiError::Api {
                status: 503,
                detail,
            }),
            Reply::Slow(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Reply::Hold(notify, response) => {
                notify.notified().await;
                Ok(response)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Response builders
// ---------------------------------------------------------------------------

pub fn pending() -> TaskStatusResponse {
    TaskStatusResponse::with_status("PENDING")
}

pub fn processing(step: Option<&str>) -> TaskStatusResponse {
    TaskStatusResponse {
        step: step.map(str::to_string),
        ..TaskStatusResponse::with_status("PROCESSING")
    }
}

pub fn success(result: serde_json::Value) -> TaskStatusResponse {
    TaskStatusResponse {
        result: Some(result),
        ..TaskStatusResponse::with_status("SUCCESS")
    }
}

pub fn failure(message: &str) -> TaskStatusResponse {
    TaskStatusResponse {
        error: Some(serde_json::Value::String(message.to_string())),
        ..TaskStatusResponse::with_status("FAILURE")
    }
}

/// Yield to spawned tasks until `cond` holds, letting paused time advance.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}
