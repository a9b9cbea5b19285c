//! `swissknife` -- command-line front end for the SwissKnife processing
//! service.
//!
//! Submits media, image and text jobs, follows them until they finish and
//! optionally downloads the results.
//!
//! # Environment variables
//!
//! | Variable               | Required | Default                        | Description                      |
//! |------------------------|----------|--------------------------------|----------------------------------|
//! | `SWISSKNIFE_API_URL`   | no       | `http://localhost:8000/api/v1` | Service API base URL             |
//! | `POLL_INTERVAL_MS`     | no       | `2000`                         | Delay between status polls       |
//! | `REQUEST_TIMEOUT_SECS` | no       | `30`                           | Per-request HTTP timeout         |
//! | `WATCH_TIMEOUT_SECS`   | no       | --                             | Stop watching a job after this   |
//! | `RUST_LOG`             | no       | `swissknife=info,...`          | Log filter (logs go to stderr)   |
//!
//! # Exit codes
//!
//! `0` every job succeeded, `1` a job failed or monitoring broke off,
//! `2` nothing was started, `130` interrupted.

mod app;
mod args;
mod render;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use swissknife_client::config::{validate_api_url, ClientConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::{App, EXIT_NOT_STARTED};
use crate::args::Cli;
use crate::render::Renderer;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.quiet {
        "swissknife=warn,swissknife_client=warn"
    } else {
        "swissknife=info,swissknife_client=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_NOT_STARTED)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = ClientConfig::from_env().context("invalid configuration")?;
    if let Some(url) = &cli.api_url {
        config.api_url = validate_api_url(url)?;
    }
    if let Some(ms) = cli.poll_interval_ms {
        anyhow::ensure!(ms > 0, "--poll-interval-ms must be greater than 0");
        config.poll_interval = Duration::from_millis(ms);
    }

    tracing::debug!(
        api_url = %config.api_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Configuration loaded",
    );

    let renderer = Renderer {
        json: cli.json,
        quiet: cli.quiet,
    };
    let app = App::new(&config, renderer, cli.download_dir)?;
    app.run(cli.command).await
}
