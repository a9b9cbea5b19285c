//! Terminal output for job notifications.
//!
//! Human-readable lines go to stdout; in `--json` mode every line is a JSON
//! object whose `type` is one of the `job_*` message types. Diagnostics
//! always go through `tracing` to stderr.

use std::path::Path;

use serde_json::{json, Value};
use swissknife_client::events::JobEvent;
use swissknife_client::messages::TextToolResponse;
use swissknife_client::monitor::MonitorError;
use swissknife_client::session::BatchSummary;
use swissknife_client::submitter::{JobHandle, SubmissionError};
use swissknife_core::job::Job;
use swissknife_core::job_events::{
    MSG_TYPE_JOB_CANCELLED, MSG_TYPE_JOB_DOWNLOADED, MSG_TYPE_JOB_SUBMITTED,
};

const MSG_TYPE_SUBMISSION_FAILED: &str = "submission_failed";
const MSG_TYPE_SUMMARY: &str = "summary";
const MSG_TYPE_WATCH_FAILED: &str = "watch_failed";
const MSG_TYPE_TEXT_RESULT: &str = "text_result";

#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer {
    pub json: bool,
    pub quiet: bool,
}

impl Renderer {
    pub fn submitted(&self, handle: &JobHandle) {
        if self.json {
            emit(json!({
                "type": MSG_TYPE_JOB_SUBMITTED,
                "job_id": handle.id(),
                "kind": handle.kind,
                "label": handle.label,
            }));
        } else if !self.quiet {
            println!("{} submitted as {}", display_name(handle.id(), handle.label.as_deref()), handle.id());
        }
    }

    pub fn submission_failed(&self, err: &SubmissionError) {
        if self.json {
            emit(json!({ "type": MSG_TYPE_SUBMISSION_FAILED, "error": err.reason() }));
        } else {
            eprintln!("error: {}", err.reason());
        }
    }

    /// A submitted job that could not be monitored.
    pub fn watch_failed(&self, job_id: &str, err: &MonitorError) {
        if self.json {
            emit(watch_failed_json(job_id, err));
        } else {
            eprintln!("error: [{job_id}] {err}");
        }
    }

    pub fn event(&self, event: &JobEvent, label: Option<&str>) {
        if self.json {
            emit(event_json(event, label));
            return;
        }
        if self.quiet && !event.is_terminal() {
            return;
        }
        let name = display_name(event.job_id(), label);
        match event {
            JobEvent::Progress { job } => match job.step.as_deref() {
                Some(step) => println!("{name}: {} ({step})", job.state),
                None => println!("{name}: {}", job.state),
            },
            JobEvent::Succeeded { job } => println!("{name}: done{}", result_suffix(job)),
            JobEvent::Failed { job } => {
                println!("{name}: failed: {}", job.error.as_deref().unwrap_or_default())
            }
            JobEvent::TransportError { error, .. } => println!(
                "{name}: lost contact with the service ({error}); the job may still be running"
            ),
            JobEvent::UnknownStatus { raw_status, .. } => {
                println!("{name}: unrecognised status '{raw_status}', still waiting")
            }
            JobEvent::TimedOut { elapsed, .. } => {
                println!("{name}: gave up after {}s", elapsed.as_secs())
            }
        }
    }

    pub fn cancelled(&self, job_ids: &[String]) {
        if self.json {
            for job_id in job_ids {
                emit(json!({ "type": MSG_TYPE_JOB_CANCELLED, "job_id": job_id }));
            }
        } else if !job_ids.is_empty() {
            println!("cancelled monitoring of {} job(s)", job_ids.len());
        }
    }

    pub fn downloaded(&self, job_id: &str, path: &Path) {
        if self.json {
            emit(json!({
                "type": MSG_TYPE_JOB_DOWNLOADED,
                "job_id": job_id,
                "path": path.display().to_string(),
            }));
        } else {
            println!("saved {}", path.display());
        }
    }

    pub fn summary(&self, summary: &BatchSummary) {
        if self.json {
            let mut value = serde_json::to_value(summary).unwrap_or(Value::Null);
            if let Value::Object(map) = &mut value {
                map.insert("type".into(), Value::from(MSG_TYPE_SUMMARY));
            }
            emit(value);
        } else if summary.total > 1 || !self.quiet {
            println!("{summary}");
        }
    }

    pub fn text_result(&self, response: &TextToolResponse) {
        if self.json {
            emit(json!({
                "type": MSG_TYPE_TEXT_RESULT,
                "status": response.status,
                "data": response.data,
                "filename": response.filename,
            }));
            return;
        }
        if let Some(data) = &response.data {
            println!("{data}");
        }
        if let Some(filename) = &response.filename {
            println!("output file: {filename}");
        }
    }
}

/// JSON form of one notification.
pub fn event_json(event: &JobEvent, label: Option<&str>) -> Value {
    let mut value = json!({
        "type": event.message_type(),
        "job_id": event.job_id(),
    });
    let Value::Object(map) = &mut value else {
        return value;
    };
    if let Some(label) = label {
        map.insert("label".into(), Value::from(label));
    }
    match event {
        JobEvent::Progress { job } | JobEvent::Succeeded { job } | JobEvent::Failed { job } => {
            map.insert("state".into(), Value::from(job.state.as_str()));
            if let Some(step) = &job.step {
                map.insert("step".into(), Value::from(step.as_str()));
            }
            if let Some(result) = &job.result {
                map.insert("result".into(), result.clone());
            }
            if let Some(error) = &job.error {
                map.insert("error".into(), Value::from(error.as_str()));
            }
        }
        JobEvent::TransportError { error, .. } => {
            map.insert("error".into(), Value::from(error.as_str()));
        }
        JobEvent::UnknownStatus {
            raw_status, step, ..
        } => {
            map.insert("raw_status".into(), Value::from(raw_status.as_str()));
            if let Some(step) = step {
                map.insert("step".into(), Value::from(step.as_str()));
            }
        }
        JobEvent::TimedOut { elapsed, .. } => {
            map.insert("elapsed_secs".into(), Value::from(elapsed.as_secs()));
        }
    }
    value
}

pub fn watch_failed_json(job_id: &str, err: &MonitorError) -> Value {
    json!({
        "type": MSG_TYPE_WATCH_FAILED,
        "job_id": job_id,
        "error": err.to_string(),
    })
}

fn emit(value: Value) {
    println!("{value}");
}

fn display_name(job_id: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("[{label}]"),
        None => format!("[{job_id}]"),
    }
}

fn result_suffix(job: &Job) -> String {
    if let Some(text) = job.result_text() {
        return format!("\n{text}");
    }
    match job.result_filename() {
        Some(filename) => format!(" -> {filename}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use swissknife_core::job::{JobState, Observation};
    use swissknife_core::job_events::{MSG_TYPE_JOB_COMPLETED, MSG_TYPE_JOB_TIMED_OUT};

    use super::*;

    #[test]
    fn succeeded_event_carries_result() {
        let mut job = Job::pending("t1");
        job.observe(
            Observation::new(JobState::Succeeded).with_result(json!({"filename": "out.mp3"})),
            Utc::now(),
        )
        .unwrap();

        let value = event_json(&JobEvent::Succeeded { job }, Some("song.wav"));
        assert_eq!(value["type"], MSG_TYPE_JOB_COMPLETED);
        assert_eq!(value["job_id"], "t1");
        assert_eq!(value["label"], "song.wav");
        assert_eq!(value["state"], "succeeded");
        assert_eq!(value["result"]["filename"], "out.mp3");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn timed_out_event_reports_seconds() {
        let value = event_json(
            &JobEvent::TimedOut {
                job_id: "t2".into(),
                elapsed: Duration::from_secs(90),
            },
            None,
        );
        assert_eq!(value["type"], MSG_TYPE_JOB_TIMED_OUT);
        assert_eq!(value["elapsed_secs"], 90);
        assert!(value.get("label").is_none());
    }

    #[test]
    fn watch_failure_names_the_job() {
        let err = MonitorError::AlreadyWatched("t4".into());
        let value = watch_failed_json("t4", &err);
        assert_eq!(value["type"], "watch_failed");
        assert_eq!(value["job_id"], "t4");
        assert_eq!(value["error"], "Job t4 is already being watched");
    }

    #[test]
    fn ocr_text_printed_on_its_own_line() {
        let mut job = Job::pending("t3");
        job.observe(
            Observation::new(JobState::Succeeded).with_result(json!({"text": "hello"})),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(result_suffix(&job), "\nhello");
    }
}
