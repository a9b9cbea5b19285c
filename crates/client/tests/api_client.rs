//! Integration tests for the HTTP client and submitter against a mock
//! processing service.

use std::path::PathBuf;
use std::sync::Arc;

use assert_matches::assert_matches;
use mockito::Matcher;
use serde_json::json;
use swissknife_client::api::{ApiError, ProcessingApi};
use swissknife_client::events::JobEvent;
use swissknife_client::messages::GENERIC_API_ERROR;
use swissknife_client::monitor::{MonitorConfig, TaskMonitor};
use swissknife_client::submitter::{SubmissionError, Submitter};
use swissknife_core::job::JobState;
use swissknife_core::request::{BatchRequest, ImageAction, JobRequest};
use swissknife_core::text::{Base64Action, TextRequest};

const API_PREFIX: &str = "/api/v1";

fn api_for(server: &mockito::ServerGuard) -> Arc<ProcessingApi> {
    Arc::new(ProcessingApi::new(format!("{}{API_PREFIX}", server.url())))
}

fn upload_fixture(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"not really media").unwrap();
    path
}

// ---------------------------------------------------------------------------
// Test: submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn convert_submission_returns_pending_handle() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/media/convert")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="file"; filename="clip.mp4""#.to_string()),
            Matcher::Regex(r#"name="target_format""#.to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"task_id":"abc-123","status":"processing","original_filename":"clip.mp4"}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let request = JobRequest::MediaConvert {
        file: upload_fixture(&dir, "clip.mp4"),
        target_format: "mp3".into(),
    };

    let handle = Submitter::new(api_for(&server)).submit(&request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(handle.id(), "abc-123");
    assert_eq!(handle.job.state, JobState::Pending);
    assert_eq!(handle.kind, "media_convert");
    assert_eq!(handle.label.as_deref(), Some("clip.mp4"));
}

#[tokio::test]
async fn url_download_is_posted_as_json() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/media/download")
        .match_body(Matcher::Json(json!({
            "url": "https://example.com/watch?v=1",
            "format": "mp4",
            "quality": "best",
        })))
        .with_status(200)
        .with_body(r#"{"task_id":"dl-1","status":"processing"}"#)
        .create_async()
        .await;

    let request = JobRequest::UrlDownload {
        url: " https://example.com/watch?v=1 ".into(),
        format: "mp4".into(),
        quality: "best".into(),
    };
    let handle = Submitter::new(api_for(&server)).submit(&request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(handle.id(), "dl-1");
    assert_eq!(handle.label.as_deref(), Some("https://example.com/watch?v=1"));
}

#[tokio::test]
async fn rejected_submission_surfaces_detail() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/v1/visual/ocr")
        .with_status(400)
        .with_body(r#"{"detail":"Unsupported image type"}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let request = JobRequest::Ocr {
        file: upload_fixture(&dir, "scan.tiff"),
        lang: "eng".into(),
    };
    let err = Submitter::new(api_for(&server)).submit(&request).await.unwrap_err();

    assert_matches!(&err, SubmissionError::Rejected { status: 400, detail } if detail == "Unsupported image type");
    assert_eq!(err.reason(), "Unsupported image type");
}

#[tokio::test]
async fn server_error_without_detail_uses_generic_message() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/v1/visual/remove-bg")
        .with_status(502)
        .with_body("<html>Bad Gateway</html>")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let request = JobRequest::RemoveBackground {
        file: upload_fixture(&dir, "cat.png"),
    };
    let err = Submitter::new(api_for(&server)).submit(&request).await.unwrap_err();

    assert_matches!(err, SubmissionError::Rejected { status: 502, detail } if detail == GENERIC_API_ERROR);
}

#[tokio::test]
async fn response_without_task_id_is_malformed() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/v1/media/gif")
        .with_status(200)
        .with_body(r#"{"status":"processing"}"#)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let request = JobRequest::Gif {
        file: upload_fixture(&dir, "clip.mov"),
        fps: 10,
        width: 480,
    };
    let err = Submitter::new(api_for(&server)).submit(&request).await.unwrap_err();

    assert_matches!(err, SubmissionError::MalformedResponse(_));
}

#[tokio::test]
async fn invalid_request_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/media/compress")
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let request = JobRequest::MediaCompress {
        file: upload_fixture(&dir, "clip.mp4"),
        crf: 60,
    };
    let err = Submitter::new(api_for(&server)).submit(&request).await.unwrap_err();

    assert_matches!(err, SubmissionError::InvalidRequest(_));
    mock.assert_async().await;
}

#[tokio::test]
async fn missing_upload_file_is_reported() {
    let server = mockito::Server::new_async().await;
    let request = JobRequest::MediaCut {
        file: PathBuf::from("/definitely/not/here.mp4"),
        start_time: "00:00:05".into(),
        end_time: "00:00:10".into(),
    };
    let err = Submitter::new(api_for(&server)).submit(&request).await.unwrap_err();

    assert_matches!(err, SubmissionError::Upload(msg) if msg.contains("here.mp4"));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_failure() {
    let api = Arc::new(ProcessingApi::new("http://127.0.0.1:9/api/v1".into()));
    let request = JobRequest::UrlDownload {
        url: "https://example.com/v".into(),
        format: "mp4".into(),
        quality: "best".into(),
    };
    let err = Submitter::new(api).submit(&request).await.unwrap_err();

    assert_matches!(err, SubmissionError::Transport(_));
}

#[tokio::test]
async fn batch_submission_returns_one_handle_per_file() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/visual/batch-process")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"filename="a.png""#.to_string()),
            Matcher::Regex(r#"filename="b.png""#.to_string()),
            Matcher::Regex("grayscale".to_string()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"tasks":[{"task_id":"t1","filename":"a.png"},{"task_id":"t2","filename":"b.png"}],"status":"processing"}"#,
        )
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let batch = BatchRequest {
        files: vec![upload_fixture(&dir, "a.png"), upload_fixture(&dir, "b.png")],
        action: ImageAction::Grayscale,
        params: json!({}),
    };
    let handles = Submitter::new(api_for(&server))
        .submit_batch(&batch)
        .await
        .unwrap();

    mock.assert_async().await;
    let ids: Vec<&str> = handles.iter().map(|h| h.id()).collect();
    assert_eq!(ids, ["t1", "t2"]);
    assert_eq!(handles[1].label.as_deref(), Some("b.png"));
}

// ---------------------------------------------------------------------------
// Test: status, download, text tools
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_task_parses_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/v1/tasks/t-42")
        .with_status(200)
        .with_body(r#"{"task_id":"t-42","status":"PROCESSING","step":"downloading","result":null,"error":null}"#)
        .create_async()
        .await;

    let response = api_for(&server).get_task("t-42").await.unwrap();
    assert_eq!(response.status, "PROCESSING");
    assert_eq!(response.step.as_deref(), Some("downloading"));
    assert!(response.result.is_none());
}

#[tokio::test]
async fn download_percent_encodes_filename() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/download/my%20song%231.mp3")
        .with_status(200)
        .with_body(b"ID3fake")
        .create_async()
        .await;

    let bytes = api_for(&server).download("my song#1.mp3").await.unwrap();

    mock.assert_async().await;
    assert_eq!(bytes, b"ID3fake");
}

#[tokio::test]
async fn missing_download_is_an_api_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/v1/download/gone.mp4")
        .with_status(404)
        .with_body(r#"{"detail":"File not found"}"#)
        .create_async()
        .await;

    let err = api_for(&server).download("gone.mp4").await.unwrap_err();
    assert_matches!(err, ApiError::Api { status: 404, detail } if detail == "File not found");
}

#[tokio::test]
async fn base64_tool_returns_inline_data() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/v1/text/base64")
        .match_body(Matcher::Json(json!({"data": "hi", "action": "encode"})))
        .with_status(200)
        .with_body(r#"{"status":"success","data":"aGk="}"#)
        .create_async()
        .await;

    let request = TextRequest::Base64 {
        data: "hi".into(),
        action: Base64Action::Encode,
    };
    let response = api_for(&server).run_text_tool(&request).await.unwrap();
    assert_eq!(response.data.as_deref(), Some("aGk="));
    assert!(response.filename.is_none());
}

// ---------------------------------------------------------------------------
// Test: submit then monitor over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submitted_job_is_monitored_to_completion() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/v1/visual/process")
        .with_status(200)
        .with_body(r#"{"task_id":"img-7"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/v1/tasks/img-7")
        .with_status(200)
        .with_body(r#"{"task_id":"img-7","status":"success","result":{"status":"success","filename":"processed_a.png","action":"rotate"}}"#)
        .create_async()
        .await;

    let api = api_for(&server);
    let dir = tempfile::tempdir().unwrap();
    let request = JobRequest::ImageProcess {
        file: upload_fixture(&dir, "a.png"),
        action: ImageAction::Rotate,
        params: json!({"angle": 90}),
    };
    let handle = Submitter::new(api.clone()).submit(&request).await.unwrap();

    let monitor = TaskMonitor::new(api, MonitorConfig::default());
    let mut sub = monitor.watch_job(handle.job).unwrap();

    match sub.recv().await {
        Some(JobEvent::Succeeded { job }) => {
            assert_eq!(job.id, "img-7");
            assert_eq!(job.result_filename(), Some("processed_a.png"));
        }
        other => panic!("Expected Succeeded, got {other:?}"),
    }
    assert!(sub.recv().await.is_none());
}

#[tokio::test]
async fn failing_status_endpoint_ends_monitoring() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/tasks/t-9")
        .with_status(500)
        .with_body(r#"{"detail":"Redis unavailable"}"#)
        .expect(1)
        .create_async()
        .await;

    let monitor = TaskMonitor::new(api_for(&server), MonitorConfig::default());
    let mut sub = monitor.watch("t-9").unwrap();

    assert_matches!(
        sub.recv().await,
        Some(JobEvent::TransportError { error, .. }) if error.contains("Redis unavailable")
    );
    assert!(sub.recv().await.is_none());
    mock.assert_async().await;
}
