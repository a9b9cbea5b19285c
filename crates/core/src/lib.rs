//! Domain types shared by the SwissKnife client crates.
//!
//! Holds the job state machine, the catalogue of job requests the remote
//! processing service accepts, and the event type constants used when
//! rendering monitor notifications. No I/O happens in this crate.

pub mod error;
pub mod job;
pub mod job_events;
pub mod request;
pub mod text;
pub mod types;
