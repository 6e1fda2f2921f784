//! Ingestion job lifecycle.
//!
//! Jobs are created `running`, mutated in place by the one pipeline run that
//! owns them, and reach `done`/`failed`. Rows carry a TTL: past
//! `expires_at` they are invisible to reads and purged by the sweep, which
//! also fails orphaned jobs still `running` after 30 minutes. The "one
//! running web job" rule is enforced with a conditional insert into
//! `job_locks`, not a read-then-write check.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::frontmatter;
use crate::models::{
    IngestionJob, JobKind, JobStatus, QuarantinedFile, TruthLevel, ValidationSummary,
    WebhookPayload, now_epoch,
};
use crate::webhook::CompletionHandler;
use crate::worker::{ExtractionWorker, WorkerJobStatus};

/// Error surface of job submission; conflicts get their own variant so the
/// HTTP layer can answer 409.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ---------- store ----------

pub async fn create_job(
    pool: &SqlitePool,
    kind: JobKind,
    ttl_secs: i64,
    source_url: Option<&str>,
    truth_level: Option<TruthLevel>,
) -> Result<IngestionJob> {
    let now = now_epoch();
    let job = IngestionJob {
        id: Uuid::new_v4().to_string(),
        kind,
        status: JobStatus::Running,
        created_at: now,
        updated_at: now,
        finished_at: None,
        return_code: None,
        log: Vec::new(),
        source_url: source_url.map(|s| s.to_string()),
        truth_level,
    };
    sqlx::query(
        r#"
        INSERT INTO jobs (id, kind, status, created_at, updated_at, finished_at,
            return_code, log, source_url, truth_level, expires_at)
        VALUES (?, ?, ?, ?, ?, NULL, NULL, '[]', ?, ?, ?)
        "#,
    )
    .bind(&job.id)
    .bind(kind.as_str())
    .bind(job.status.as_str())
    .bind(now)
    .bind(now)
    .bind(&job.source_url)
    .bind(truth_level.map(|t| t.as_str()))
    .bind(now + ttl_secs)
    .execute(pool)
    .await?;
    Ok(job)
}

/// Fetches a job; expired rows are invisible.
pub async fn get_job(pool: &SqlitePool, id: &str) -> Result<Option<IngestionJob>> {
    let row: Option<(
        String,
        String,
        String,
        i64,
        i64,
        Option<i64>,
        Option<i64>,
        String,
        Option<String>,
        Option<String>,
    )> = sqlx::query_as(
        "SELECT id, kind, status, created_at, updated_at, finished_at, return_code, \
         log, source_url, truth_level FROM jobs WHERE id = ? AND expires_at > ?",
    )
    .bind(id)
    .bind(now_epoch())
    .fetch_optional(pool)
    .await?;

    let Some((id, kind, status, created_at, updated_at, finished_at, return_code, log, source_url, truth_level)) =
        row
    else {
        return Ok(None);
    };

    Ok(Some(IngestionJob {
        id,
        kind: JobKind::parse(&kind).context("unknown job kind in store")?,
        status: JobStatus::parse(&status).context("unknown job status in store")?,
        created_at,
        updated_at,
        finished_at,
        return_code,
        log: serde_json::from_str(&log).unwrap_or_default(),
        source_url,
        truth_level: truth_level.as_deref().and_then(TruthLevel::parse),
    }))
}

pub async fn set_status(
    pool: &SqlitePool,
    id: &str,
    status: JobStatus,
    return_code: Option<i64>,
) -> Result<()> {
    let now = now_epoch();
    let finished_at = if status.is_terminal() { Some(now) } else { None };
    sqlx::query(
        "UPDATE jobs SET status = ?, updated_at = ?, finished_at = COALESCE(?, finished_at), \
         return_code = COALESCE(?, return_code) WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(now)
    .bind(finished_at)
    .bind(return_code)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Appends one log line. The owning pipeline run is the only writer, so
/// read-modify-write is safe here.
pub async fn append_log(pool: &SqlitePool, id: &str, line: &str) -> Result<()> {
    let current: Option<String> = sqlx::query_scalar("SELECT log FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let mut log: Vec<String> = current
        .as_deref()
        .and_then(|l| serde_json::from_str(l).ok())
        .unwrap_or_default();
    log.push(line.to_string());
    sqlx::query("UPDATE jobs SET log = ?, updated_at = ? WHERE id = ?")
        .bind(serde_json::to_string(&log)?)
        .bind(now_epoch())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Atomic insert-if-absent: true when this job now holds the kind's
/// single-flight slot.
pub async fn acquire_lock(pool: &SqlitePool, kind: JobKind, job_id: &str) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO job_locks (kind, job_id, acquired_at) VALUES (?, ?, ?) \
         ON CONFLICT(kind) DO NOTHING",
    )
    .bind(kind.as_str())
    .bind(job_id)
    .bind(now_epoch())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn release_lock(pool: &SqlitePool, kind: JobKind, job_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM job_locks WHERE kind = ? AND job_id = ?")
        .bind(kind.as_str())
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub orphaned: usize,
    pub purged: u64,
    pub locks_released: u64,
}

/// Fails orphaned running jobs, purges expired rows, and releases locks
/// whose job is no longer running.
pub async fn sweep_jobs(pool: &SqlitePool, orphan_after_secs: i64) -> Result<SweepReport> {
    let now = now_epoch();
    let mut report = SweepReport::default();

    let orphans: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM jobs WHERE status = 'running' AND updated_at < ?",
    )
    .bind(now - orphan_after_secs)
    .fetch_all(pool)
    .await?;
    for id in &orphans {
        append_log(
            pool,
            id,
            &format!("swept to failed: still running after {}s", orphan_after_secs),
        )
        .await?;
        set_status(pool, id, JobStatus::Failed, None).await?;
        warn!(job_id = %id, "orphaned job swept to failed");
    }
    report.orphaned = orphans.len();

    report.purged = sqlx::query("DELETE FROM jobs WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?
        .rows_affected();

    report.locks_released = sqlx::query(
        "DELETE FROM job_locks WHERE job_id NOT IN (SELECT id FROM jobs WHERE status = 'running')",
    )
    .execute(pool)
    .await?
    .rows_affected();

    Ok(report)
}

/// Background sweep loop; fire-and-forget, stops with the process.
pub fn spawn_sweeper(pool: SqlitePool, interval: Duration, orphan_after_secs: i64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep_jobs(&pool, orphan_after_secs).await {
                Ok(report) if report.orphaned > 0 || report.purged > 0 => {
                    info!(
                        orphaned = report.orphaned,
                        purged = report.purged,
                        "job sweep completed"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "job sweep failed"),
            }
        }
    });
}

/// Polls one worker-side job until terminal, on a fixed interval with a
/// bounded attempt budget. Returns `None` when the budget runs out first.
/// Interval and budget are parameters so tests can fast-forward.
pub async fn poll_until_terminal(
    worker: &dyn ExtractionWorker,
    worker_job_id: &str,
    interval: Duration,
    max_attempts: u32,
) -> Option<WorkerJobStatus> {
    for attempt in 1..=max_attempts {
        match worker.job_status(worker_job_id).await {
            Ok(status) if status.status.is_terminal() => return Some(status),
            Ok(_) => {}
            Err(e) => warn!(%worker_job_id, attempt, error = %e, "worker status poll failed"),
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    None
}

// ---------- orchestration ----------

pub struct Orchestrator {
    pool: SqlitePool,
    config: Arc<Config>,
    worker: Arc<dyn ExtractionWorker>,
    retrieval: Arc<crate::retrieval::RetrievalClient>,
    completions: Arc<CompletionHandler>,
}

impl Orchestrator {
    pub fn new(
        pool: SqlitePool,
        config: Arc<Config>,
        worker: Arc<dyn ExtractionWorker>,
        retrieval: Arc<crate::retrieval::RetrievalClient>,
        completions: Arc<CompletionHandler>,
    ) -> Self {
        Self {
            pool,
            config,
            worker,
            retrieval,
            completions,
        }
    }

    /// Submits a web ingestion job. At most one may run at a time; a second
    /// request while one is active is a conflict.
    pub async fn submit_web(
        &self,
        url: &str,
        truth_level: TruthLevel,
    ) -> Result<IngestionJob, SubmitError> {
        let job = create_job(
            &self.pool,
            JobKind::Web,
            self.config.jobs.ttl_secs,
            Some(url),
            Some(truth_level),
        )
        .await?;

        if !acquire_lock(&self.pool, JobKind::Web, &job.id).await? {
            set_status(&self.pool, &job.id, JobStatus::Failed, None).await?;
            append_log(&self.pool, &job.id, "rejected: a web job is already running").await?;
            return Err(SubmitError::Conflict(
                "a web ingestion job is already running".to_string(),
            ));
        }

        let this = self.clone_parts();
        let job_id = job.id.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            let outcome = this.run_web_pipeline(&job_id, &url).await;
            this.finish_job(&job_id, JobKind::Web, outcome).await;
            if let Err(e) = release_lock(&this.pool, JobKind::Web, &job_id).await {
                error!(%job_id, error = %e, "failed to release web job lock");
            }
        });

        Ok(job)
    }

    /// Submits a PDF ingestion job: stage, hand off to the worker, poll.
    pub async fn submit_pdf(&self, source: &Path) -> Result<IngestionJob, SubmitError> {
        if !source.exists() {
            return Err(SubmitError::Other(anyhow::anyhow!(
                "source file does not exist: {}",
                source.display()
            )));
        }
        let job = create_job(&self.pool, JobKind::Pdf, self.config.jobs.ttl_secs, None, None)
            .await?;

        let this = self.clone_parts();
        let job_id = job.id.clone();
        let source = source.to_path_buf();
        tokio::spawn(async move {
            let outcome = this.run_pdf_pipeline(&job_id, &source).await;
            this.finish_job(&job_id, JobKind::Pdf, outcome).await;
        });

        Ok(job)
    }

    fn clone_parts(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            config: self.config.clone(),
            worker: self.worker.clone(),
            retrieval: self.retrieval.clone(),
            completions: self.completions.clone(),
        }
    }

    /// Applies a pipeline outcome to the job row and triggers completion
    /// resolution. Pipeline errors become the job's terminal state, never a
    /// caller-visible failure.
    async fn finish_job(
        &self,
        job_id: &str,
        kind: JobKind,
        outcome: Result<PipelineSuccess>,
    ) {
        let (status, files, validation) = match outcome {
            Ok(success) => {
                if let Err(e) = set_status(&self.pool, job_id, JobStatus::Done, Some(0)).await {
                    error!(%job_id, error = %e, "failed to persist job success");
                }
                (JobStatus::Done, success.files_created, success.validation)
            }
            Err(e) => {
                let _ = append_log(&self.pool, job_id, &format!("pipeline failed: {:#}", e)).await;
                if let Err(e) = set_status(&self.pool, job_id, JobStatus::Failed, None).await {
                    error!(%job_id, error = %e, "failed to persist job failure");
                }
                (JobStatus::Failed, Vec::new(), None)
            }
        };

        let payload = WebhookPayload {
            job_id: job_id.to_string(),
            source: kind,
            status,
            files_created: files,
        };
        if let Err(e) = self.completions.handle(&payload, validation).await {
            error!(%job_id, error = %e, "completion resolution failed");
        }
    }

    /// Web jobs are fully orchestrated here: extract, detect the produced
    /// category, copy into the knowledge store, validate (quarantining
    /// invalid files), reindex the survivors, clean up scratch.
    async fn run_web_pipeline(&self, job_id: &str, url: &str) -> Result<PipelineSuccess> {
        let knowledge = &self.config.knowledge;
        // File mtimes have second granularity; back the cutoff off so files
        // written in the submission second are not missed.
        let job_started = chrono::Utc::now() - chrono::Duration::seconds(2);

        let scratch = self.config.jobs.scratch_dir.join(job_id);
        append_log(&self.pool, job_id, &format!("extracting {}", url)).await?;
        let extraction = self.worker.extract_url(url, &scratch).await?;
        for line in &extraction.log_lines {
            append_log(&self.pool, job_id, line).await?;
        }

        let produced = detect_output_dir(&extraction.output_dir)?;
        let category_label = produced
            .strip_prefix(&extraction.output_dir)
            .ok()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| "flat".to_string());
        append_log(&self.pool, job_id, &format!("detected output category: {}", category_label))
            .await?;

        let dest = knowledge.intake_dir().join("web");
        let copied = copy_markdown(&produced, &dest)?;
        append_log(&self.pool, job_id, &format!("copied {} files into intake", copied.len()))
            .await?;

        let intake_subdir = format!("{}/web", knowledge.intake_subdir);
        let report =
            frontmatter::validate_intake_zone(knowledge, &intake_subdir, Some(job_started))?;
        for entry in &report.quarantined {
            append_log(
                &self.pool,
                job_id,
                &format!("quarantined {}: {}", entry.filename, entry.reason),
            )
            .await?;
        }

        let valid_rel: Vec<String> = report
            .valid_paths
            .iter()
            .map(|p| {
                p.strip_prefix(&knowledge.root)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        if !valid_rel.is_empty() {
            self.retrieval
                .reindex(&valid_rel)
                .await
                .map_err(|e| anyhow::anyhow!("reindex failed: {}", e))?;
            append_log(&self.pool, job_id, &format!("reindexed {} files", valid_rel.len()))
                .await?;
        }

        if scratch.exists() {
            std::fs::remove_dir_all(&scratch)?;
        }

        Ok(PipelineSuccess {
            files_created: valid_rel,
            validation: Some(ValidationSummary {
                total_files: report.total_examined,
                valid_files: report.valid_paths.len(),
                quarantined_files: report.quarantined.len(),
                quarantined: report
                    .quarantined
                    .iter()
                    .map(|q| QuarantinedFile {
                        filename: q.filename.clone(),
                        reason: q.reason.clone(),
                    })
                    .collect(),
            }),
        })
    }

    /// PDF jobs delegate extraction and indexing to the worker; this side
    /// only stages the file, submits, and polls.
    async fn run_pdf_pipeline(&self, job_id: &str, source: &Path) -> Result<PipelineSuccess> {
        let knowledge = &self.config.knowledge;
        let job_started = chrono::Utc::now() - chrono::Duration::seconds(2);

        let run_dir = self.config.jobs.staging_dir.join(job_id);
        std::fs::create_dir_all(&run_dir)?;
        let filename = source
            .file_name()
            .context("source path has no file name")?;
        let staged = run_dir.join(filename);
        std::fs::copy(source, &staged)
            .with_context(|| format!("failed to stage {}", source.display()))?;
        append_log(&self.pool, job_id, &format!("staged {}", staged.display())).await?;

        let worker_job_id = self.worker.submit_pdf(&staged).await?;
        append_log(&self.pool, job_id, &format!("worker job {}", worker_job_id)).await?;

        let interval = Duration::from_secs(self.config.jobs.poll_interval_secs);
        let attempts = self.config.jobs.poll_max_attempts;
        let terminal =
            poll_until_terminal(self.worker.as_ref(), &worker_job_id, interval, attempts).await;

        let status = match terminal {
            Some(status) => status,
            None => bail!("worker did not finish within {} poll attempts", attempts),
        };
        for line in &status.log_tail {
            append_log(&self.pool, job_id, line).await?;
        }
        if status.status == JobStatus::Failed {
            bail!(
                "worker job failed with return code {:?}",
                status.return_code
            );
        }

        let report =
            frontmatter::validate_intake_zone(knowledge, &knowledge.intake_subdir, Some(job_started))?;
        let valid_rel: Vec<String> = report
            .valid_paths
            .iter()
            .map(|p| {
                p.strip_prefix(&knowledge.root)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .to_string()
            })
            .collect();

        Ok(PipelineSuccess {
            files_created: valid_rel,
            validation: Some(ValidationSummary {
                total_files: report.total_examined,
                valid_files: report.valid_paths.len(),
                quarantined_files: report.quarantined.len(),
                quarantined: report
                    .quarantined
                    .iter()
                    .map(|q| QuarantinedFile {
                        filename: q.filename.clone(),
                        reason: q.reason.clone(),
                    })
                    .collect(),
            }),
        })
    }
}

struct PipelineSuccess {
    files_created: Vec<String>,
    validation: Option<ValidationSummary>,
}

/// The extraction writes markdown under a category subdirectory; pick the
/// one with the most markdown files, falling back to the root itself.
fn detect_output_dir(output_dir: &Path) -> Result<PathBuf> {
    let mut best: Option<(usize, PathBuf)> = None;
    for entry in std::fs::read_dir(output_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let count = std::fs::read_dir(&path)?
            .flatten()
            .filter(|e| e.path().extension().map(|x| x == "md").unwrap_or(false))
            .count();
        if count > 0 && best.as_ref().map(|(c, _)| count > *c).unwrap_or(true) {
            best = Some((count, path));
        }
    }
    Ok(best.map(|(_, p)| p).unwrap_or_else(|| output_dir.to_path_buf()))
}

fn copy_markdown(from: &Path, to: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(to)?;
    let mut copied = Vec::new();
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map(|e| e != "md").unwrap_or(true) {
            continue;
        }
        let Some(name) = path.file_name() else { continue };
        let dest = to.join(name);
        std::fs::copy(&path, &dest)?;
        copied.push(dest);
    }
    copied.sort();
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_memory;
    use crate::migrate::run_migrations;
    use crate::worker::ExtractionOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;

    async fn pool() -> SqlitePool {
        let pool = connect_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn job_roundtrip_and_log_append() {
        let pool = pool().await;
        let job = create_job(&pool, JobKind::Web, 3600, Some("https://x"), Some(TruthLevel::L3))
            .await
            .unwrap();
        append_log(&pool, &job.id, "first line").await.unwrap();
        set_status(&pool, &job.id, JobStatus::Done, Some(0)).await.unwrap();

        let fetched = get_job(&pool, &job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Done);
        assert_eq!(fetched.return_code, Some(0));
        assert_eq!(fetched.log, vec!["first line"]);
        assert_eq!(fetched.truth_level, Some(TruthLevel::L3));
        assert!(fetched.finished_at.is_some());
    }

    #[tokio::test]
    async fn expired_jobs_are_invisible() {
        let pool = pool().await;
        let job = create_job(&pool, JobKind::Pdf, -1, None, None).await.unwrap();
        assert!(get_job(&pool, &job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lock_is_single_flight() {
        let pool = pool().await;
        assert!(acquire_lock(&pool, JobKind::Web, "job-1").await.unwrap());
        assert!(!acquire_lock(&pool, JobKind::Web, "job-2").await.unwrap());
        release_lock(&pool, JobKind::Web, "job-1").await.unwrap();
        assert!(acquire_lock(&pool, JobKind::Web, "job-3").await.unwrap());
    }

    #[tokio::test]
    async fn sweep_fails_orphans_and_purges_expired() {
        let pool = pool().await;
        let orphan = create_job(&pool, JobKind::Web, 3600, None, None).await.unwrap();
        sqlx::query("UPDATE jobs SET updated_at = ? WHERE id = ?")
            .bind(now_epoch() - 3600)
            .bind(&orphan.id)
            .execute(&pool)
            .await
            .unwrap();
        let expired = create_job(&pool, JobKind::Pdf, -10, None, None).await.unwrap();

        let report = sweep_jobs(&pool, 1800).await.unwrap();
        assert_eq!(report.orphaned, 1);
        assert_eq!(report.purged, 1);

        let swept = get_job(&pool, &orphan.id).await.unwrap().unwrap();
        assert_eq!(swept.status, JobStatus::Failed);
        assert!(swept.log.iter().any(|l| l.contains("swept to failed")));
        assert!(get_job(&pool, &expired.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_releases_locks_of_dead_jobs() {
        let pool = pool().await;
        let job = create_job(&pool, JobKind::Web, 3600, None, None).await.unwrap();
        acquire_lock(&pool, JobKind::Web, &job.id).await.unwrap();
        set_status(&pool, &job.id, JobStatus::Failed, None).await.unwrap();

        let report = sweep_jobs(&pool, 1800).await.unwrap();
        assert_eq!(report.locks_released, 1);
        assert!(acquire_lock(&pool, JobKind::Web, "new-job").await.unwrap());
    }

    /// Worker that replays a scripted sequence of status responses.
    struct ScriptedWorker {
        statuses: Mutex<Vec<WorkerJobStatus>>,
    }

    #[async_trait]
    impl ExtractionWorker for ScriptedWorker {
        async fn submit_pdf(&self, _staged: &Path) -> Result<String> {
            Ok("w-1".to_string())
        }
        async fn job_status(&self, _id: &str) -> Result<WorkerJobStatus> {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                Ok(statuses.remove(0))
            } else {
                Ok(statuses[0].clone())
            }
        }
        async fn extract_url(&self, _url: &str, scratch: &Path) -> Result<ExtractionOutput> {
            Ok(ExtractionOutput {
                output_dir: scratch.to_path_buf(),
                log_lines: Vec::new(),
            })
        }
    }

    fn status(s: JobStatus) -> WorkerJobStatus {
        WorkerJobStatus {
            status: s,
            pid: None,
            started_at: None,
            finished_at: None,
            return_code: if s == JobStatus::Done { Some(0) } else { None },
            log_tail: Vec::new(),
        }
    }

    #[tokio::test]
    async fn poll_stops_at_terminal_status() {
        let worker = ScriptedWorker {
            statuses: Mutex::new(vec![
                status(JobStatus::Running),
                status(JobStatus::Running),
                status(JobStatus::Done),
            ]),
        };
        let result =
            poll_until_terminal(&worker, "w-1", Duration::from_millis(1), 20).await;
        assert_eq!(result.unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn poll_gives_up_after_attempt_budget() {
        let worker = ScriptedWorker {
            statuses: Mutex::new(vec![status(JobStatus::Running)]),
        };
        let result = poll_until_terminal(&worker, "w-1", Duration::from_millis(1), 3).await;
        assert!(result.is_none());
    }
}
