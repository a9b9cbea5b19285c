//! Command execution: submit, follow, download.
//!
//! Each invocation is one view. It owns a single [`MonitorSession`]; the
//! session is dropped (and every poller stopped) when the command returns,
//! whether it finished, failed or was interrupted with Ctrl-C.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use swissknife_client::api::ProcessingApi;
use swissknife_client::config::ClientConfig;
use swissknife_client::events::JobEvent;
use swissknife_client::monitor::TaskMonitor;
use swissknife_client::session::MonitorSession;
use swissknife_client::submitter::{JobHandle, SubmissionError, Submitter};
use swissknife_core::job::Job;
use swissknife_core::text::TextRequest;
use tokio::io::AsyncReadExt;

use crate::args::{batch_request, Command, TextCommand};
use crate::render::Renderer;

/// At least one job ended in failure, transport error or timeout.
pub const EXIT_JOB_FAILED: u8 = 1;
/// Nothing was started: bad configuration, invalid request or rejected
/// submission.
pub const EXIT_NOT_STARTED: u8 = 2;
/// Interrupted with Ctrl-C.
pub const EXIT_INTERRUPTED: u8 = 130;

pub struct App {
    api: Arc<ProcessingApi>,
    submitter: Submitter,
    monitor: TaskMonitor,
    renderer: Renderer,
    download_dir: Option<PathBuf>,
}

impl App {
    pub fn new(
        config: &ClientConfig,
        renderer: Renderer,
        download_dir: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let api = Arc::new(ProcessingApi::from_config(config).context("failed to build HTTP client")?);
        let monitor = TaskMonitor::new(api.clone(), config.monitor_config());
        Ok(Self {
            submitter: Submitter::new(api.clone()),
            api,
            monitor,
            renderer,
            download_dir,
        })
    }

    pub async fn run(&self, command: Command) -> anyhow::Result<ExitCode> {
        match command {
            Command::Convert { .. }
            | Command::Compress { .. }
            | Command::Cut { .. }
            | Command::Gif { .. }
            | Command::FetchUrl { .. }
            | Command::Image { .. }
            | Command::Ocr { .. }
            | Command::RemoveBg { .. } => {
                let request = command
                    .job_request()?
                    .context("command does not submit a single job")?;
                match self.submitter.submit(&request).await {
                    Ok(handle) => self.follow(vec![handle]).await,
                    Err(e) => Ok(self.not_started(&e)),
                }
            }
            Command::Batch {
                files,
                action,
                params,
            } => {
                let batch = batch_request(&files, action, &params)?;
                match self.submitter.submit_batch(&batch).await {
                    Ok(handles) => self.follow(handles).await,
                    Err(e) => Ok(self.not_started(&e)),
                }
            }
            Command::Watch { task_ids } => {
                let handles = task_ids
                    .into_iter()
                    .map(|id| JobHandle {
                        job: Job::pending(id),
                        kind: "watch",
                        label: None,
                    })
                    .collect();
                self.follow(handles).await
            }
            Command::Download { filename, output } => {
                let target = match output {
                    Some(path) => path,
                    None => self.target_path(&filename)?,
                };
                let bytes = self.api.download(&filename).await?;
                write_file(&target, &bytes).await?;
                self.renderer.downloaded(&filename, &target);
                Ok(ExitCode::SUCCESS)
            }
            Command::Text { tool } => self.text(tool).await,
        }
    }

    /// Watch `handles` until every job settles or the user presses Ctrl-C.
    ///
    /// The jobs already exist remotely, so a job that cannot be watched is
    /// reported and counted as failed rather than aborting the others.
    async fn follow(&self, handles: Vec<JobHandle>) -> anyhow::Result<ExitCode> {
        let mut session = MonitorSession::new(self.monitor.clone());
        let mut unwatched = 0;
        for handle in &handles {
            self.renderer.submitted(handle);
            if let Err(e) = session.watch_handle(handle) {
                tracing::error!(job_id = %handle.id(), error = %e, "Cannot watch job");
                self.renderer.watch_failed(handle.id(), &e);
                unwatched += 1;
            }
        }

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interrupted = false;
        let mut download_failed = false;

        while !interrupted {
            let event = tokio::select! {
                event = session.recv() => event,
                _ = &mut ctrl_c => {
                    interrupted = true;
                    None
                }
            };
            let Some(event) = event else { break };
            self.renderer.event(&event, session.label(event.job_id()));

            let JobEvent::Succeeded { job } = &event else {
                continue;
            };
            tokio::select! {
                result = self.download_result(job) => {
                    if let Err(e) = result {
                        tracing::error!(job_id = %job.id, error = %e, "Result download failed");
                        download_failed = true;
                    }
                }
                _ = &mut ctrl_c => {
                    tracing::info!(job_id = %job.id, "Interrupted during result download");
                    interrupted = true;
                }
            }
        }

        if interrupted {
            tracing::info!("Interrupted, cancelling monitoring");
            let pending: Vec<String> = session
                .jobs()
                .into_iter()
                .filter(|job| !job.is_terminal())
                .map(|job| job.id)
                .collect();
            session.cancel_all();
            self.renderer.cancelled(&pending);
        }

        let mut summary = session.summary();
        summary.total += unwatched;
        summary.interrupted += unwatched;
        self.renderer.summary(&summary);

        Ok(exit_code(interrupted, summary.all_succeeded() && !download_failed))
    }

    /// Save a succeeded job's result file when `--download-dir` is set.
    async fn download_result(&self, job: &Job) -> anyhow::Result<()> {
        let (Some(_), Some(filename)) = (&self.download_dir, job.result_filename()) else {
            return Ok(());
        };
        let target = self.target_path(filename)?;
        let bytes = self
            .api
            .download(filename)
            .await
            .with_context(|| format!("downloading {filename}"))?;
        write_file(&target, &bytes).await?;
        self.renderer.downloaded(&job.id, &target);
        Ok(())
    }

    async fn text(&self, tool: TextCommand) -> anyhow::Result<ExitCode> {
        let request = match tool {
            TextCommand::Json { input } => TextRequest::FormatJson {
                data: read_input(input.as_deref()).await?,
            },
            TextCommand::Base64 { action, input } => TextRequest::Base64 {
                data: read_input(input.as_deref()).await?,
                action,
            },
            TextCommand::Diff { left, right } => TextRequest::Diff {
                text1: read_input(Some(left.as_path())).await?,
                text2: read_input(Some(right.as_path())).await?,
            },
            TextCommand::Markdown { target, input } => TextRequest::Markdown {
                data: read_input(input.as_deref()).await?,
                target,
            },
        };

        let response = match self.api.run_text_tool(&request).await {
            Ok(response) => response,
            Err(e) => return Ok(self.not_started(&SubmissionError::from(e))),
        };
        self.renderer.text_result(&response);

        if let (Some(_), Some(filename)) = (&self.download_dir, response.filename.as_deref()) {
            let target = self.target_path(filename)?;
            let bytes = self.api.download(filename).await?;
            write_file(&target, &bytes).await?;
            self.renderer.downloaded(filename, &target);
        }
        Ok(ExitCode::SUCCESS)
    }

    fn not_started(&self, err: &SubmissionError) -> ExitCode {
        tracing::warn!(error = %err, "Nothing was started");
        self.renderer.submission_failed(err);
        ExitCode::from(EXIT_NOT_STARTED)
    }

    /// Local path for a server-side file name, confined to the download dir.
    fn target_path(&self, filename: &str) -> anyhow::Result<PathBuf> {
        let name = Path::new(filename)
            .file_name()
            .with_context(|| format!("invalid file name: {filename}"))?;
        let dir = self.download_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        Ok(dir.join(name))
    }
}

fn exit_code(interrupted: bool, succeeded: bool) -> ExitCode {
    if interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_JOB_FAILED)
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

/// Read a whole file, or stdin when no path is given.
async fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("reading stdin")?;
            Ok(buf)
        }
    }
}
