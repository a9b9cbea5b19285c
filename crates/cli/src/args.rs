//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use swissknife_core::error::CoreError;
use swissknife_core::request::{
    BatchRequest, ImageAction, JobRequest, DEFAULT_CRF, DEFAULT_DOWNLOAD_FORMAT,
    DEFAULT_DOWNLOAD_QUALITY, DEFAULT_GIF_FPS, DEFAULT_GIF_WIDTH, DEFAULT_OCR_LANG,
    DEFAULT_TARGET_FORMAT,
};
use swissknife_core::text::{Base64Action, MarkdownTarget};

#[derive(Debug, Parser)]
#[command(
    name = "swissknife",
    version,
    about = "Submit media, image and text jobs to a SwissKnife service and follow them to completion"
)]
pub struct Cli {
    /// Base URL of the service API (overrides SWISSKNIFE_API_URL).
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Milliseconds between status polls (overrides POLL_INTERVAL_MS).
    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    /// Print one JSON object per line instead of human-readable output.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Save the result file of every succeeded job into this directory.
    #[arg(long, global = true)]
    pub download_dir: Option<PathBuf>,

    /// Only print final results and errors.
    #[arg(long, short, global = true, default_value_t = false)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert audio or video into another format.
    Convert {
        file: PathBuf,
        #[arg(long, short = 'f', default_value = DEFAULT_TARGET_FORMAT)]
        format: String,
    },
    /// Re-encode a video at a given quality (CRF 0-51, lower is better).
    Compress {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_CRF)]
        crf: u8,
    },
    /// Cut a clip between two timestamps (seconds or HH:MM:SS).
    Cut {
        file: PathBuf,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Turn a video into an animated GIF.
    Gif {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_GIF_FPS)]
        fps: u32,
        #[arg(long, default_value_t = DEFAULT_GIF_WIDTH)]
        width: u32,
    },
    /// Download media from a URL.
    FetchUrl {
        url: String,
        #[arg(long, default_value = DEFAULT_DOWNLOAD_FORMAT)]
        format: String,
        #[arg(long, default_value = DEFAULT_DOWNLOAD_QUALITY)]
        quality: String,
    },
    /// Process one image (convert, resize, rotate, grayscale, remove-bg).
    Image {
        file: PathBuf,
        #[arg(long)]
        action: ImageAction,
        /// Action parameters as a JSON object, e.g. '{"angle": 90}'.
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Extract text from an image.
    Ocr {
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_OCR_LANG)]
        lang: String,
    },
    /// Remove the background of an image.
    RemoveBg { file: PathBuf },
    /// Apply one image action to many files, one job per file.
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        action: ImageAction,
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Follow jobs that were submitted earlier.
    Watch {
        #[arg(required = true)]
        task_ids: Vec<String>,
    },
    /// Download a result file by name.
    Download {
        filename: String,
        /// Output path (defaults to the file name in the download dir or
        /// the current directory).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Synchronous text utilities.
    Text {
        #[command(subcommand)]
        tool: TextCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum TextCommand {
    /// Pretty-print JSON read from a file or stdin.
    Json { input: Option<PathBuf> },
    /// Base64 encode or decode.
    Base64 {
        #[arg(long, default_value = "encode")]
        action: Base64Action,
        input: Option<PathBuf>,
    },
    /// Line diff of two files.
    Diff { left: PathBuf, right: PathBuf },
    /// Render markdown to HTML or PDF.
    Markdown {
        #[arg(long, default_value = "html")]
        target: MarkdownTarget,
        input: Option<PathBuf>,
    },
}

impl Command {
    /// The single-job request for this command, if it is one.
    pub fn job_request(&self) -> Result<Option<JobRequest>, CoreError> {
        let request = match self {
            Command::Convert { file, format } => JobRequest::MediaConvert {
                file: file.clone(),
                target_format: format.clone(),
            },
            Command::Compress { file, crf } => JobRequest::MediaCompress {
                file: file.clone(),
                crf: *crf,
            },
            Command::Cut { file, start, end } => JobRequest::MediaCut {
                file: file.clone(),
                start_time: start.clone(),
                end_time: end.clone(),
            },
            Command::Gif { file, fps, width } => JobRequest::Gif {
                file: file.clone(),
                fps: *fps,
                width: *width,
            },
            Command::FetchUrl {
                url,
                format,
                quality,
            } => JobRequest::UrlDownload {
                url: url.clone(),
                format: format.clone(),
                quality: quality.clone(),
            },
            Command::Image {
                file,
                action,
                params,
            } => JobRequest::ImageProcess {
                file: file.clone(),
                action: *action,
                params: parse_params(params)?,
            },
            Command::Ocr { file, lang } => JobRequest::Ocr {
                file: file.clone(),
                lang: lang.clone(),
            },
            Command::RemoveBg { file } => JobRequest::RemoveBackground { file: file.clone() },
            Command::Batch { .. }
            | Command::Watch { .. }
            | Command::Download { .. }
            | Command::Text { .. } => return Ok(None),
        };
        Ok(Some(request))
    }
}

pub fn batch_request(
    files: &[PathBuf],
    action: ImageAction,
    params: &str,
) -> Result<BatchRequest, CoreError> {
    Ok(BatchRequest {
        files: files.to_vec(),
        action,
        params: parse_params(params)?,
    })
}

fn parse_params(raw: &str) -> Result<serde_json::Value, CoreError> {
    serde_json::from_str(raw)
        .map_err(|e| CoreError::Validation(format!("--params is not valid JSON: {e}")))
}
