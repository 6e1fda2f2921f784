//! Extraction worker seam.
//!
//! Heavy content extraction (PDF parsing, web scraping, index writing) runs
//! in an external worker process that also takes the advisory reindex lock.
//! This module owns the typed interface to it; the subprocess detail stays
//! behind [`CommandWorker`] so orchestration logic and tests never touch a
//! real process.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::config::WorkerConfig;
use crate::models::JobStatus;

/// Status snapshot of one worker-side job. The worker reports camelCase
/// fields (`startedAt`, `returnCode`, `logTail`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerJobStatus {
    pub status: JobStatus,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub finished_at: Option<i64>,
    #[serde(default)]
    pub return_code: Option<i64>,
    #[serde(default)]
    pub log_tail: Vec<String>,
}

/// Result of a URL extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionOutput {
    pub output_dir: PathBuf,
    pub log_lines: Vec<String>,
}

#[async_trait]
pub trait ExtractionWorker: Send + Sync {
    /// Hands a staged PDF to the worker; returns the worker-side job id.
    async fn submit_pdf(&self, staged: &Path) -> Result<String>;

    /// Polls one worker-side job.
    async fn job_status(&self, worker_job_id: &str) -> Result<WorkerJobStatus>;

    /// Extracts a URL's content into the given scratch directory.
    async fn extract_url(&self, url: &str, scratch: &Path) -> Result<ExtractionOutput>;
}

/// Subprocess-backed worker.
pub struct CommandWorker {
    command: String,
}

impl CommandWorker {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            command: config.command.clone(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!(command = %self.command, ?args, "invoking extraction worker");
        let output = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("failed to launch extraction worker '{}'", self.command))?;
        Ok(output)
    }
}

#[async_trait]
impl ExtractionWorker for CommandWorker {
    async fn submit_pdf(&self, staged: &Path) -> Result<String> {
        let staged_str = staged.to_string_lossy();
        let output = self.run(&["submit-pdf", &staged_str]).await?;
        if !output.status.success() {
            bail!(
                "worker submit-pdf failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let job_id = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        if job_id.is_empty() {
            bail!("worker submit-pdf returned no job id");
        }
        Ok(job_id)
    }

    async fn job_status(&self, worker_job_id: &str) -> Result<WorkerJobStatus> {
        let output = self.run(&["status", worker_job_id, "--json"]).await?;
        if !output.status.success() {
            bail!(
                "worker status failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let status: WorkerJobStatus = serde_json::from_slice(&output.stdout)
            .context("worker status returned invalid JSON")?;
        Ok(status)
    }

    async fn extract_url(&self, url: &str, scratch: &Path) -> Result<ExtractionOutput> {
        std::fs::create_dir_all(scratch)?;
        let scratch_str = scratch.to_string_lossy();
        let output = self.run(&["extract-url", url, "--out", &scratch_str]).await?;
        let log_lines: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.to_string())
            .collect();
        if !output.status.success() {
            bail!(
                "worker extract-url failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(ExtractionOutput {
            output_dir: scratch.to_path_buf(),
            log_lines,
        })
    }
}
