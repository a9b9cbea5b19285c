//! Synchronous text tools exposed by the processing service.
//!
//! Unlike [`JobRequest`](crate::request::JobRequest)s these return their
//! output directly in the response; nothing is monitored.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

pub const ENDPOINT_TEXT_JSON_FORMAT: &str = "/text/json/format";
pub const ENDPOINT_TEXT_BASE64: &str = "/text/base64";
pub const ENDPOINT_TEXT_DIFF: &str = "/text/diff";
pub const ENDPOINT_TEXT_MARKDOWN: &str = "/text/markdown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base64Action {
    Encode,
    Decode,
}

impl Base64Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Base64Action::Encode => "encode",
            Base64Action::Decode => "decode",
        }
    }
}

impl FromStr for Base64Action {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "encode" => Ok(Base64Action::Encode),
            "decode" => Ok(Base64Action::Decode),
            other => Err(CoreError::Validation(format!(
                "Unknown base64 action: '{other}'. Valid actions: encode, decode"
            ))),
        }
    }
}

/// Output of the markdown renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkdownTarget {
    /// HTML returned inline in `data`.
    Html,
    /// PDF written server-side; the response carries a download `filename`.
    Pdf,
}

impl MarkdownTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkdownTarget::Html => "html",
            MarkdownTarget::Pdf => "pdf",
        }
    }
}

impl FromStr for MarkdownTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(MarkdownTarget::Html),
            "pdf" => Ok(MarkdownTarget::Pdf),
            other => Err(CoreError::Validation(format!(
                "Unknown markdown target: '{other}'. Valid targets: html, pdf"
            ))),
        }
    }
}

impl fmt::Display for MarkdownTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextRequest {
    FormatJson { data: String },
    Base64 { data: String, action: Base64Action },
    Diff { text1: String, text2: String },
    Markdown { data: String, target: MarkdownTarget },
}

impl TextRequest {
    pub fn endpoint(&self) -> &'static str {
        match self {
            TextRequest::FormatJson { .. } => ENDPOINT_TEXT_JSON_FORMAT,
            TextRequest::Base64 { .. } => ENDPOINT_TEXT_BASE64,
            TextRequest::Diff { .. } => ENDPOINT_TEXT_DIFF,
            TextRequest::Markdown { .. } => ENDPOINT_TEXT_MARKDOWN,
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            TextRequest::FormatJson { data } => serde_json::json!({ "data": data }),
            TextRequest::Base64 { data, action } => serde_json::json!({
                "data": data,
                "action": action.as_str(),
            }),
            TextRequest::Diff { text1, text2 } => serde_json::json!({
                "text1": text1,
                "text2": text2,
            }),
            TextRequest::Markdown { data, target } => serde_json::json!({
                "data": data,
                "target": target.as_str(),
            }),
        }
    }
}
