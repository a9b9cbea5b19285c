//! HTTP client and task monitor for the SwissKnife processing service.
//!
//! Submitting work goes through [`submitter::Submitter`], which turns a
//! [`JobRequest`](swissknife_core::request::JobRequest) into a remote job.
//! Progress is observed through [`monitor::TaskMonitor`]: each watched job
//! gets its own polling task that delivers [`events::JobEvent`]s until the
//! job reaches a terminal state or the subscription is cancelled.
//! [`session::MonitorSession`] groups many subscriptions for one view.

pub mod api;
pub mod config;
pub mod events;
pub mod messages;
pub mod monitor;
pub mod session;
pub mod submitter;
