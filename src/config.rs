use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub knowledge: KnowledgeConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    /// Root of the knowledge store; intake, quarantine, gammes and
    /// diagnostics directories all live under it.
    pub root: PathBuf,
    #[serde(default = "default_intake_subdir")]
    pub intake_subdir: String,
    #[serde(default = "default_quarantine_subdir")]
    pub quarantine_subdir: String,
    #[serde(default = "default_gammes_subdir")]
    pub gammes_subdir: String,
    #[serde(default = "default_diagnostics_subdir")]
    pub diagnostics_subdir: String,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

fn default_intake_subdir() -> String {
    "intake".to_string()
}
fn default_quarantine_subdir() -> String {
    "quarantine".to_string()
}
fn default_gammes_subdir() -> String {
    "gammes".to_string()
}
fn default_diagnostics_subdir() -> String {
    "diagnostics".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

impl KnowledgeConfig {
    pub fn intake_dir(&self) -> PathBuf {
        self.root.join(&self.intake_subdir)
    }
    pub fn quarantine_dir(&self) -> PathBuf {
        self.root.join(&self.quarantine_subdir)
    }
    pub fn gammes_dir(&self) -> PathBuf {
        self.root.join(&self.gammes_subdir)
    }
    pub fn diagnostics_dir(&self) -> PathBuf {
        self.root.join(&self.diagnostics_subdir)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Base URL of the external retrieval/AI service.
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the service API key, if the service
    /// requires one.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    #[serde(default = "default_job_ttl_secs")]
    pub ttl_secs: i64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Running jobs older than this are swept to failed.
    #[serde(default = "default_orphan_after_secs")]
    pub orphan_after_secs: i64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_job_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            orphan_after_secs: default_orphan_after_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_max_attempts: default_poll_max_attempts(),
            scratch_dir: default_scratch_dir(),
            staging_dir: default_staging_dir(),
        }
    }
}

fn default_job_ttl_secs() -> i64 {
    3600
}
fn default_sweep_interval_secs() -> u64 {
    600
}
fn default_orphan_after_secs() -> i64 {
    1800
}
fn default_poll_interval_secs() -> u64 {
    15
}
fn default_poll_max_attempts() -> u32 {
    20
}
fn default_scratch_dir() -> PathBuf {
    PathBuf::from("./data/scratch")
}
fn default_staging_dir() -> PathBuf {
    PathBuf::from("./data/staging")
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    /// Extraction worker executable. The worker takes the advisory reindex
    /// lock itself; this process only invokes it.
    #[serde(default = "default_worker_command")]
    pub command: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: default_worker_command(),
        }
    }
}

fn default_worker_command() -> String {
    "knowledge-worker".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Shared secret for webhook HMAC signatures. Verification is disabled
    /// when unset.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.base_url.is_empty() {
        anyhow::bail!("retrieval.base_url must not be empty");
    }

    if config.jobs.ttl_secs <= 0 {
        anyhow::bail!("jobs.ttl_secs must be > 0");
    }

    if config.jobs.poll_max_attempts == 0 {
        anyhow::bail!("jobs.poll_max_attempts must be >= 1");
    }

    if config.jobs.orphan_after_secs <= 0 {
        anyhow::bail!("jobs.orphan_after_secs must be > 0");
    }

    if config.server.bind.is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    Ok(config)
}
