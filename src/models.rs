//! Core data types flowing through the ingestion and retrieval gateway.

use serde::{Deserialize, Serialize};

/// Authoritativeness tier attached to every knowledge document.
/// L1 is the most authoritative; L4 is draft-grade and excluded from
/// default retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TruthLevel {
    L1,
    L2,
    L3,
    L4,
}

impl TruthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TruthLevel::L1 => "L1",
            TruthLevel::L2 => "L2",
            TruthLevel::L3 => "L3",
            TruthLevel::L4 => "L4",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "L1" => Some(TruthLevel::L1),
            "L2" => Some(TruthLevel::L2),
            "L3" => Some(TruthLevel::L3),
            "L4" => Some(TruthLevel::L4),
            _ => None,
        }
    }
}

/// Content category of a knowledge document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Catalog,
    Guide,
    Diagnostic,
    Knowledge,
    Policy,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Catalog => "catalog",
            Category::Guide => "guide",
            Category::Diagnostic => "diagnostic",
            Category::Knowledge => "knowledge",
            Category::Policy => "policy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "catalog" => Some(Category::Catalog),
            "guide" => Some(Category::Guide),
            "diagnostic" => Some(Category::Diagnostic),
            "knowledge" => Some(Category::Knowledge),
            "policy" => Some(Category::Policy),
            _ => None,
        }
    }
}

/// Immutable input to the ingestion decision pipeline.
#[derive(Debug, Clone)]
pub struct IngestDocument {
    pub title: String,
    pub content: String,
    /// Slash-delimited path whose first segment is the source prefix
    /// (e.g. `web/disque-frein-section.md`).
    pub source: String,
    pub truth_level: TruthLevel,
    /// Topical domain used for quota accounting (e.g. `freinage`).
    pub domain: String,
    pub category: Category,
}

/// Terminal verdict of the decision pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    AcceptUpsert,
    RejectQuarantine,
    ArchiveAsDuplicate,
    ArchiveByQuota,
}

/// Stored lifecycle state of a knowledge document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    Active,
    Archived,
    Quarantined,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStatus::Active => "active",
            DocStatus::Archived => "archived",
            DocStatus::Quarantined => "quarantined",
        }
    }
}

/// Outcome of the four admission gates for one document. Produced once,
/// consumed immediately by the apply step, never persisted on its own.
#[derive(Debug, Clone, Serialize)]
pub struct IngestDecision {
    pub verdict: Verdict,
    pub reasons: Vec<String>,
    pub fingerprint: String,
    /// Section-group-collapsed source id; the upsert key.
    pub parent_source: String,
    pub status: DocStatus,
    pub retrievable: bool,
    /// Id of the already-active document this one duplicates, if any.
    pub duplicate_of: Option<String>,
}

/// Kind of an ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Pdf,
    Web,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Pdf => "pdf",
            JobKind::Web => "web",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(JobKind::Pdf),
            "web" => Some(JobKind::Web),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(JobStatus::Running),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// One PDF or web ingestion job, persisted with a TTL.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionJob {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub finished_at: Option<i64>,
    pub return_code: Option<i64>,
    pub log: Vec<String>,
    pub source_url: Option<String>,
    pub truth_level: Option<TruthLevel>,
}

/// Inbound out-of-band completion signal.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub job_id: String,
    pub source: JobKind,
    pub status: JobStatus,
    #[serde(default)]
    pub files_created: Vec<String>,
}

/// Per-file quarantine outcome included in the validation summary.
#[derive(Debug, Clone, Serialize)]
pub struct QuarantinedFile {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total_files: usize,
    pub valid_files: usize,
    pub quarantined_files: usize,
    pub quarantined: Vec<QuarantinedFile>,
}

/// Outbound completion event consumed by downstream content-refresh
/// collaborators. Serialized camelCase on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub job_id: String,
    pub source: JobKind,
    pub status: JobStatus,
    /// Epoch seconds.
    pub completed_at: i64,
    pub affected_gammes: Vec<String>,
    pub affected_gammes_map: std::collections::BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_diagnostics: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_summary: Option<ValidationSummary>,
}

/// Append-only audit trail entry for one webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookAuditRecord {
    pub job_id: String,
    pub source: JobKind,
    pub status: JobStatus,
    pub files_created: Vec<String>,
    pub gammes: Vec<String>,
    pub diagnostics: Vec<String>,
    pub event_emitted: bool,
    pub error: Option<String>,
    pub duration_ms: i64,
}

pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
