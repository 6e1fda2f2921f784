//! Ingestion admission control.
//!
//! Every knowledge document passes four ordered gates before it may be
//! upserted into the corpus: source compatibility, domain quota, exact
//! dedup, retrievability. The first rejecting gate wins. Quarantine and
//! archive verdicts are policy outcomes, not errors; they always carry
//! machine-readable reasons.
//!
//! Quota is checked before dedup on purpose: a duplicate landing in an
//! over-quota domain reports ARCHIVE_BY_QUOTA (see DESIGN.md).

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::fingerprint::fingerprint;
use crate::models::{
    Category, DocStatus, IngestDecision, IngestDocument, TruthLevel, Verdict, now_epoch,
};

struct SourceRule {
    prefix: &'static str,
    categories: &'static [Category],
    truth_levels: &'static [TruthLevel],
}

/// Which categories and truth levels each source prefix may carry.
const COMPATIBILITY_MATRIX: &[SourceRule] = &[
    SourceRule {
        prefix: "gammes",
        categories: &[Category::Catalog],
        truth_levels: &[TruthLevel::L1, TruthLevel::L2],
    },
    SourceRule {
        prefix: "guides",
        categories: &[Category::Guide],
        truth_levels: &[TruthLevel::L1, TruthLevel::L2],
    },
    SourceRule {
        prefix: "diagnostics",
        categories: &[Category::Diagnostic],
        truth_levels: &[TruthLevel::L1, TruthLevel::L2],
    },
    SourceRule {
        prefix: "web",
        categories: &[Category::Knowledge, Category::Guide],
        truth_levels: &[TruthLevel::L2, TruthLevel::L3],
    },
    SourceRule {
        prefix: "pdf",
        categories: &[Category::Catalog, Category::Knowledge, Category::Guide],
        truth_levels: &[TruthLevel::L1, TruthLevel::L2, TruthLevel::L3],
    },
    SourceRule {
        prefix: "faq",
        categories: &[Category::Knowledge],
        truth_levels: &[TruthLevel::L2, TruthLevel::L3],
    },
    SourceRule {
        prefix: "policy",
        categories: &[Category::Policy],
        truth_levels: &[TruthLevel::L1, TruthLevel::L2],
    },
    SourceRule {
        prefix: "notes",
        categories: &[Category::Knowledge],
        truth_levels: &[TruthLevel::L2, TruthLevel::L3, TruthLevel::L4],
    },
];

/// Active-document cap per topical domain.
const DOMAIN_QUOTAS: &[(&str, i64)] = &[
    ("freinage", 15),
    ("filtration", 12),
    ("suspension", 12),
    ("distribution", 10),
];

const DEFAULT_DOMAIN_QUOTA: i64 = 10;

fn domain_quota(domain: &str) -> i64 {
    DOMAIN_QUOTAS
        .iter()
        .find(|(d, _)| *d == domain)
        .map(|(_, cap)| *cap)
        .unwrap_or(DEFAULT_DOMAIN_QUOTA)
}

/// Text before the first `.` or `/` of the source path.
fn source_prefix(source: &str) -> &str {
    let end = source
        .find(|c| c == '.' || c == '/')
        .unwrap_or(source.len());
    &source[..end]
}

/// Collapses a section-numbered source to its logical parent so repeated
/// ingestions of the same section update one row. `web/disque-frein-section-2.md`
/// and `web/disque-frein-section.md` both map to `web/disque-frein`.
pub fn parent_source(source: &str) -> String {
    let stem = match source.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => source,
    };
    strip_section_suffix(stem).to_string()
}

fn strip_section_suffix(s: &str) -> &str {
    if let Some(base) = s.strip_suffix("-section") {
        return base;
    }
    if let Some(idx) = s.rfind("-section-") {
        let tail = &s[idx + "-section-".len()..];
        if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            return &s[..idx];
        }
    }
    s
}

/// Runs the four admission gates for one document. Read-only; the verdict
/// is applied separately by [`apply`].
pub async fn decide(pool: &SqlitePool, doc: &IngestDocument) -> Result<IngestDecision> {
    let fp = fingerprint(&doc.content);
    let parent = parent_source(&doc.source);

    // Gate 1: source compatibility
    let prefix = source_prefix(&doc.source);
    let rule = COMPATIBILITY_MATRIX.iter().find(|r| r.prefix == prefix);
    let mut violations = Vec::new();
    match rule {
        None => violations.push(format!("UNKNOWN_SOURCE_PREFIX: {}", prefix)),
        Some(rule) => {
            if !rule.categories.contains(&doc.category) {
                violations.push(format!(
                    "INCOMPATIBLE_CATEGORY: {} not allowed for {}",
                    doc.category.as_str(),
                    prefix
                ));
            }
            if !rule.truth_levels.contains(&doc.truth_level) {
                violations.push(format!(
                    "INCOMPATIBLE_TRUTH_LEVEL: {} not allowed for {}",
                    doc.truth_level.as_str(),
                    prefix
                ));
            }
        }
    }
    if !violations.is_empty() {
        return Ok(IngestDecision {
            verdict: Verdict::RejectQuarantine,
            reasons: violations,
            fingerprint: fp,
            parent_source: parent,
            status: DocStatus::Quarantined,
            retrievable: false,
            duplicate_of: None,
        });
    }

    // Gate 2: domain quota
    let cap = domain_quota(&doc.domain);
    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM documents WHERE domain = ? AND status = 'active'",
    )
    .bind(&doc.domain)
    .fetch_one(pool)
    .await?;
    if active >= cap {
        return Ok(IngestDecision {
            verdict: Verdict::ArchiveByQuota,
            reasons: vec![format!(
                "DOMAIN_QUOTA_REACHED: {} has {} active documents (cap {})",
                doc.domain, active, cap
            )],
            fingerprint: fp,
            parent_source: parent,
            status: DocStatus::Archived,
            retrievable: false,
            duplicate_of: None,
        });
    }

    // Gate 3: exact dedup against active documents
    let existing: Option<String> = sqlx::query_scalar(
        "SELECT id FROM documents WHERE fingerprint = ? AND status = 'active' \
         ORDER BY source LIMIT 1",
    )
    .bind(&fp)
    .fetch_optional(pool)
    .await?;
    if let Some(existing_id) = existing {
        return Ok(IngestDecision {
            verdict: Verdict::ArchiveAsDuplicate,
            reasons: vec![format!("DUPLICATE_CONTENT: matches document {}", existing_id)],
            fingerprint: fp,
            parent_source: parent,
            status: DocStatus::Archived,
            retrievable: false,
            duplicate_of: Some(existing_id),
        });
    }

    // Gate 4: retrievability. Informational only, never a rejection.
    let mut reasons = Vec::new();
    let mut retrievable = true;
    if doc.truth_level == TruthLevel::L4 {
        retrievable = false;
        reasons.push("NON_RETRIEVABLE_TRUTH_LEVEL: L4 excluded from default retrieval".to_string());
    }
    if doc.category == Category::Policy {
        retrievable = false;
        reasons.push("NON_RETRIEVABLE_CATEGORY: policy excluded from default retrieval".to_string());
    }

    Ok(IngestDecision {
        verdict: Verdict::AcceptUpsert,
        reasons,
        fingerprint: fp,
        parent_source: parent,
        status: DocStatus::Active,
        retrievable,
        duplicate_of: None,
    })
}

/// Persists the decision, keyed by parent_source so re-ingesting the same
/// logical section updates rather than duplicates.
pub async fn apply(
    pool: &SqlitePool,
    doc: &IngestDocument,
    decision: &IngestDecision,
) -> Result<String> {
    let existing_id: Option<String> =
        sqlx::query_scalar("SELECT id FROM documents WHERE parent_source = ?")
            .bind(&decision.parent_source)
            .fetch_optional(pool)
            .await?;
    let doc_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let quarantine_reason = if decision.status == DocStatus::Quarantined {
        Some(decision.reasons.join("; "))
    } else {
        None
    };
    let now = now_epoch();

    sqlx::query(
        r#"
        INSERT INTO documents (id, source, parent_source, title, content, truth_level,
            domain, category, fingerprint, status, retrievable, duplicate_of,
            quarantine_reason, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(parent_source) DO UPDATE SET
            source = excluded.source,
            title = excluded.title,
            content = excluded.content,
            truth_level = excluded.truth_level,
            domain = excluded.domain,
            category = excluded.category,
            fingerprint = excluded.fingerprint,
            status = excluded.status,
            retrievable = excluded.retrievable,
            duplicate_of = excluded.duplicate_of,
            quarantine_reason = excluded.quarantine_reason,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&doc_id)
    .bind(&doc.source)
    .bind(&decision.parent_source)
    .bind(&doc.title)
    .bind(&doc.content)
    .bind(doc.truth_level.as_str())
    .bind(&doc.domain)
    .bind(doc.category.as_str())
    .bind(&decision.fingerprint)
    .bind(decision.status.as_str())
    .bind(decision.retrievable)
    .bind(&decision.duplicate_of)
    .bind(&quarantine_reason)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(doc_id)
}

/// Decides and applies in one step; the normal ingestion entry point.
pub async fn ingest(pool: &SqlitePool, doc: &IngestDocument) -> Result<IngestDecision> {
    let decision = decide(pool, doc).await?;
    apply(pool, doc, &decision).await?;
    info!(
        source = %doc.source,
        verdict = ?decision.verdict,
        fingerprint = %decision.fingerprint,
        "ingest decision applied"
    );
    Ok(decision)
}

/// Report returned by [`cleanup_duplicates`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct CleanupReport {
    pub scanned: usize,
    pub duplicate_groups: usize,
    pub archived: usize,
    pub actions: Vec<String>,
}

/// Batch duplicate sweep over all active documents. Within each fingerprint
/// group of more than one member, the lexicographically earliest source is
/// kept and the rest archived. `commit = false` reports without mutating.
pub async fn cleanup_duplicates(pool: &SqlitePool, commit: bool) -> Result<CleanupReport> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT id, source, fingerprint FROM documents WHERE status = 'active' \
         ORDER BY fingerprint, source",
    )
    .fetch_all(pool)
    .await?;

    let mut report = CleanupReport {
        scanned: rows.len(),
        duplicate_groups: 0,
        archived: 0,
        actions: Vec::new(),
    };

    let mut idx = 0;
    while idx < rows.len() {
        let group_end = rows[idx..]
            .iter()
            .position(|r| r.2 != rows[idx].2)
            .map(|p| idx + p)
            .unwrap_or(rows.len());
        let group = &rows[idx..group_end];
        if group.len() > 1 {
            report.duplicate_groups += 1;
            // Rows are ordered by source within the group; the first is kept.
            let (keeper_id, keeper_source, _) = &group[0];
            for (dup_id, dup_source, _) in &group[1..] {
                report.actions.push(format!(
                    "archive {} (duplicate of {})",
                    dup_source, keeper_source
                ));
                if commit {
                    sqlx::query(
                        "UPDATE documents SET status = 'archived', retrievable = 0, \
                         duplicate_of = ?, updated_at = ? WHERE id = ?",
                    )
                    .bind(keeper_id)
                    .bind(now_epoch())
                    .bind(dup_id)
                    .execute(pool)
                    .await?;
                }
                report.archived += 1;
            }
        }
        idx = group_end;
    }

    info!(
        scanned = report.scanned,
        groups = report.duplicate_groups,
        archived = report.archived,
        commit,
        "duplicate cleanup finished"
    );
    Ok(report)
}
