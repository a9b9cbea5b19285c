//! Client configuration loaded from environment variables.

use std::time::Duration;

use swissknife_core::error::CoreError;

use crate::monitor::MonitorConfig;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection and polling settings shared by the API client and monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to.
    pub api_url: String,
    /// Delay between two status polls of the same job.
    pub poll_interval: Duration,
    /// Per-request timeout applied by the HTTP client.
    pub request_timeout: Duration,
    /// Give up watching a job after this long. `None` watches forever.
    pub watch_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            watch_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env var                | Default                          |
    /// |------------------------|----------------------------------|
    /// | `SWISSKNIFE_API_URL`   | `http://localhost:8000/api/v1`   |
    /// | `POLL_INTERVAL_MS`     | `2000`                           |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                             |
    /// | `WATCH_TIMEOUT_SECS`   | unset (no timeout)               |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a caller-supplied lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = match lookup("SWISSKNIFE_API_URL") {
            Some(raw) => validate_api_url(&raw)?,
            None => defaults.api_url,
        };

        let poll_interval = match lookup("POLL_INTERVAL_MS") {
            Some(raw) => Duration::from_millis(parse_positive("POLL_INTERVAL_MS", &raw)?),
            None => defaults.poll_interval,
        };

        let request_timeout = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_positive("REQUEST_TIMEOUT_SECS", &raw)?),
            None => defaults.request_timeout,
        };

        let watch_timeout = lookup("WATCH_TIMEOUT_SECS")
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_positive("WATCH_TIMEOUT_SECS", &raw).map(Duration::from_secs))
            .transpose()?;

        Ok(Self {
            api_url,
            poll_interval,
            request_timeout,
            watch_timeout,
        })
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: self.poll_interval,
            watch_timeout: self.watch_timeout,
        }
    }
}

/// Check that `raw` is an absolute http(s) URL and strip any trailing slash.
pub fn validate_api_url(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    let parsed = reqwest::Url::parse(trimmed)
        .map_err(|e| CoreError::Validation(format!("Invalid API URL '{trimmed}': {e}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(CoreError::Validation(format!(
            "API URL must use http or https, got '{}'",
            parsed.scheme()
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn parse_positive(name: &str, raw: &str) -> Result<u64, CoreError> {
    let value: u64 = raw.trim().parse().map_err(|_| {
        CoreError::Validation(format!("{name} must be a positive integer, got '{raw}'"))
    })?;
    if value == 0 {
        return Err(CoreError::Validation(format!("{name} must be greater than 0")));
    }
    Ok(value)
}
