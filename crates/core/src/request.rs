//! Job requests accepted by the remote processing service.
//!
//! Each [`JobRequest`] variant maps to one endpoint and knows how it is
//! encoded on the wire (multipart upload or JSON body). Validation runs
//! before any network I/O so that obviously bad input never reaches the
//! service.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

pub const ENDPOINT_MEDIA_CONVERT: &str = "/media/convert";
pub const ENDPOINT_MEDIA_COMPRESS: &str = "/media/compress";
pub const ENDPOINT_MEDIA_CUT: &str = "/media/cut";
pub const ENDPOINT_MEDIA_GIF: &str = "/media/gif";
pub const ENDPOINT_MEDIA_DOWNLOAD: &str = "/media/download";
pub const ENDPOINT_VISUAL_PROCESS: &str = "/visual/process";
pub const ENDPOINT_VISUAL_OCR: &str = "/visual/ocr";
pub const ENDPOINT_VISUAL_REMOVE_BG: &str = "/visual/remove-bg";
pub const ENDPOINT_VISUAL_BATCH: &str = "/visual/batch-process";

// ---------------------------------------------------------------------------
// Defaults and limits
// ---------------------------------------------------------------------------

pub const DEFAULT_TARGET_FORMAT: &str = "mp3";
pub const DEFAULT_CRF: u8 = 28;
/// Highest CRF value ffmpeg accepts for x264.
pub const MAX_CRF: u8 = 51;
pub const DEFAULT_GIF_FPS: u32 = 10;
pub const DEFAULT_GIF_WIDTH: u32 = 480;
pub const MAX_GIF_FPS: u32 = 60;
pub const DEFAULT_DOWNLOAD_FORMAT: &str = "mp4";
pub const DEFAULT_DOWNLOAD_QUALITY: &str = "best";
pub const DEFAULT_OCR_LANG: &str = "eng";

/// Multipart field name carrying the uploaded file.
pub const FILE_FIELD: &str = "file";
/// Multipart field name carrying each file of a batch upload.
pub const BATCH_FILES_FIELD: &str = "files";

// ---------------------------------------------------------------------------
// ImageAction
// ---------------------------------------------------------------------------

/// Operation applied by the image processing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAction {
    Convert,
    Resize,
    Rotate,
    Grayscale,
    RemoveBg,
}

pub const VALID_IMAGE_ACTIONS: &[&str] = &["convert", "resize", "rotate", "grayscale", "remove_bg"];

impl ImageAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageAction::Convert => "convert",
            ImageAction::Resize => "resize",
            ImageAction::Rotate => "rotate",
            ImageAction::Grayscale => "grayscale",
            ImageAction::RemoveBg => "remove_bg",
        }
    }
}

impl fmt::Display for ImageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "convert" => Ok(ImageAction::Convert),
            "resize" => Ok(ImageAction::Resize),
            "rotate" => Ok(ImageAction::Rotate),
            "grayscale" => Ok(ImageAction::Grayscale),
            "remove_bg" => Ok(ImageAction::RemoveBg),
            other => Err(CoreError::Validation(format!(
                "Unknown image action: '{other}'. Valid actions: {}",
                VALID_IMAGE_ACTIONS.join(", ")
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// JobRequest
// ---------------------------------------------------------------------------

/// A single job submission.
#[derive(Debug, Clone, PartialEq)]
pub enum JobRequest {
    /// Transcode audio/video into another container or codec.
    MediaConvert { file: PathBuf, target_format: String },
    /// Re-encode a video with the given constant rate factor.
    MediaCompress { file: PathBuf, crf: u8 },
    /// Trim a clip to `[start_time, end_time]`.
    MediaCut {
        file: PathBuf,
        start_time: String,
        end_time: String,
    },
    /// Render a video into an animated GIF.
    Gif { file: PathBuf, fps: u32, width: u32 },
    /// Download media from a public URL (YouTube, Twitter, ...).
    UrlDownload {
        url: String,
        format: String,
        quality: String,
    },
    /// Apply an [`ImageAction`] with free-form parameters.
    ImageProcess {
        file: PathBuf,
        action: ImageAction,
        params: serde_json::Value,
    },
    /// Extract text from an image.
    Ocr { file: PathBuf, lang: String },
    /// Remove the background of an image (output is PNG).
    RemoveBackground { file: PathBuf },
}

/// How a request is encoded on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody<'a> {
    /// `multipart/form-data` with one uploaded file plus text fields.
    Multipart {
        file: &'a Path,
        fields: Vec<(&'static str, String)>,
    },
    /// `application/json` body.
    Json(serde_json::Value),
}

impl JobRequest {
    /// Short machine name, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            JobRequest::MediaConvert { .. } => "media_convert",
            JobRequest::MediaCompress { .. } => "media_compress",
            JobRequest::MediaCut { .. } => "media_cut",
            JobRequest::Gif { .. } => "gif",
            JobRequest::UrlDownload { .. } => "url_download",
            JobRequest::ImageProcess { .. } => "image_process",
            JobRequest::Ocr { .. } => "ocr",
            JobRequest::RemoveBackground { .. } => "remove_bg",
        }
    }

    /// Endpoint path relative to the API base URL.
    pub fn endpoint(&self) -> &'static str {
        match self {
            JobRequest::MediaConvert { .. } => ENDPOINT_MEDIA_CONVERT,
            JobRequest::MediaCompress { .. } => ENDPOINT_MEDIA_COMPRESS,
            JobRequest::MediaCut { .. } => ENDPOINT_MEDIA_CUT,
            JobRequest::Gif { .. } => ENDPOINT_MEDIA_GIF,
            JobRequest::UrlDownload { .. } => ENDPOINT_MEDIA_DOWNLOAD,
            JobRequest::ImageProcess { .. } => ENDPOINT_VISUAL_PROCESS,
            JobRequest::Ocr { .. } => ENDPOINT_VISUAL_OCR,
            JobRequest::RemoveBackground { .. } => ENDPOINT_VISUAL_REMOVE_BG,
        }
    }

    /// The local file this request uploads, if any.
    pub fn upload_file(&self) -> Option<&Path> {
        match self {
            JobRequest::MediaConvert { file, .. }
            | JobRequest::MediaCompress { file, .. }
            | JobRequest::MediaCut { file, .. }
            | JobRequest::Gif { file, .. }
            | JobRequest::ImageProcess { file, .. }
            | JobRequest::Ocr { file, .. }
            | JobRequest::RemoveBackground { file } => Some(file.as_path()),
            JobRequest::UrlDownload { .. } => None,
        }
    }

    /// Wire encoding of this request.
    pub fn body(&self) -> RequestBody<'_> {
        match self {
            JobRequest::MediaConvert {
                file,
                target_format,
            } => RequestBody::Multipart {
                file,
                fields: vec![("target_format", target_format.clone())],
            },
            JobRequest::MediaCompress { file, crf } => RequestBody::Multipart {
                file,
                fields: vec![("crf", crf.to_string())],
            },
            JobRequest::MediaCut {
                file,
                start_time,
                end_time,
            } => RequestBody::Multipart {
                file,
                fields: vec![
                    ("start_time", start_time.trim().to_string()),
                    ("end_time", end_time.trim().to_string()),
                ],
            },
            JobRequest::Gif { file, fps, width } => RequestBody::Multipart {
                file,
                fields: vec![("fps", fps.to_string()), ("width", width.to_string())],
            },
            JobRequest::UrlDownload {
                url,
                format,
                quality,
            } => RequestBody::Json(serde_json::json!({
                "url": url.trim(),
                "format": format,
                "quality": quality,
            })),
            JobRequest::ImageProcess {
                file,
                action,
                params,
            } => RequestBody::Multipart {
                file,
                fields: vec![
                    ("action", action.as_str().to_string()),
                    ("params", params.to_string()),
                ],
            },
            JobRequest::Ocr { file, lang } => RequestBody::Multipart {
                file,
                fields: vec![("lang", lang.clone())],
            },
            JobRequest::RemoveBackground { file } => RequestBody::Multipart {
                file,
                fields: Vec::new(),
            },
        }
    }

    /// Check the request before it is sent.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(file) = self.upload_file() {
            validate_upload_path(file)?;
        }

        match self {
            JobRequest::MediaConvert { target_format, .. } => {
                validate_format_name("target format", target_format)
            }
            JobRequest::MediaCompress { crf, .. } => validate_crf(*crf),
            JobRequest::MediaCut {
                start_time,
                end_time,
                ..
            } => {
                validate_media_time("start time", start_time)?;
                validate_media_time("end time", end_time)
            }
            JobRequest::Gif { fps, width, .. } => validate_gif_settings(*fps, *width),
            JobRequest::UrlDownload {
                url,
                format,
                quality,
            } => {
                validate_download_url(url)?;
                validate_format_name("format", format)?;
                validate_format_name("quality", quality)
            }
            JobRequest::ImageProcess { params, .. } => validate_params(params),
            JobRequest::Ocr { lang, .. } => validate_format_name("OCR language", lang),
            JobRequest::RemoveBackground { .. } => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// BatchRequest
// ---------------------------------------------------------------------------

/// Many images processed with the same action, one remote job per file.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub files: Vec<PathBuf>,
    pub action: ImageAction,
    pub params: serde_json::Value,
}

impl BatchRequest {
    pub fn endpoint(&self) -> &'static str {
        ENDPOINT_VISUAL_BATCH
    }

    /// Text fields sent next to the uploaded files.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("action", self.action.as_str().to_string()),
            ("params", self.params.to_string()),
        ]
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.files.is_empty() {
            return Err(CoreError::Validation(
                "A batch needs at least one file".to_string(),
            ));
        }
        for file in &self.files {
            validate_upload_path(file)?;
        }
        validate_params(&self.params)
    }
}

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Validate that a download URL is non-empty and starts with `http`.
pub fn validate_download_url(url: &str) -> Result<(), CoreError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(
            "Download URL must not be empty".to_string(),
        ));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(CoreError::Validation(format!(
            "Download URL must start with http:// or https://, got: '{trimmed}'"
        )));
    }
    Ok(())
}

/// Validate a constant rate factor (0 = lossless, 51 = worst).
pub fn validate_crf(crf: u8) -> Result<(), CoreError> {
    if crf > MAX_CRF {
        return Err(CoreError::Validation(format!(
            "CRF must be between 0 and {MAX_CRF}, got {crf}"
        )));
    }
    Ok(())
}

/// Validate GIF frame rate and output width.
pub fn validate_gif_settings(fps: u32, width: u32) -> Result<(), CoreError> {
    if fps == 0 || fps > MAX_GIF_FPS {
        return Err(CoreError::Validation(format!(
            "GIF frame rate must be between 1 and {MAX_GIF_FPS}, got {fps}"
        )));
    }
    if width == 0 {
        return Err(CoreError::Validation(
            "GIF width must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Validate an ffmpeg-style time position: seconds (`90`, `12.5`) or
/// `[HH:]MM:SS[.mmm]`.
pub fn validate_media_time(label: &str, value: &str) -> Result<(), CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!("{label} must not be empty")));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let well_formed = parts.len() <= 3
        && parts.iter().enumerate().all(|(idx, part)| {
            let is_last = idx == parts.len() - 1;
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_digit() || (is_last && c == '.'))
                && part.matches('.').count() <= 1
        });

    if !well_formed {
        return Err(CoreError::Validation(format!(
            "{label} must be seconds or HH:MM:SS, got: '{trimmed}'"
        )));
    }
    Ok(())
}

/// Validate short identifiers such as `mp4`, `best`, `eng` or `chi_sim`.
pub fn validate_format_name(label: &str, value: &str) -> Result<(), CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!("{label} must not be empty")));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+'))
    {
        return Err(CoreError::Validation(format!(
            "{label} contains invalid characters: '{trimmed}'"
        )));
    }
    Ok(())
}

/// Image parameters are sent as a JSON object string.
pub fn validate_params(params: &serde_json::Value) -> Result<(), CoreError> {
    if !params.is_object() {
        return Err(CoreError::Validation(format!(
            "Image parameters must be a JSON object, got: {params}"
        )));
    }
    Ok(())
}

fn validate_upload_path(path: &Path) -> Result<(), CoreError> {
    if path.as_os_str().is_empty() {
        return Err(CoreError::Validation(
            "Upload file path must not be empty".to_string(),
        ));
    }
    if path.file_name().is_none() {
        return Err(CoreError::Validation(format!(
            "Upload path has no file name: '{}'",
            path.display()
        )));
    }
    Ok(())
}
