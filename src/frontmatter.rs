//! Frontmatter parsing and validation.
//!
//! Every ingested markdown file must open with a `---` delimited metadata
//! block of flat `key: value` lines. Malformed files are quarantined with a
//! reason trail before they can reach the reindex pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::KnowledgeConfig;

/// Files modified within this window are considered part of the current
/// intake batch when no explicit cutoff is given.
const DEFAULT_INTAKE_WINDOW_MINUTES: i64 = 30;

const VALID_SOURCE_TYPES: &[&str] = &["gamme", "guide", "diagnostic", "faq", "policy", "general"];
const VALID_DOC_FAMILIES: &[&str] = &["catalog", "diagnostic", "knowledge", "guide"];
/// L4 exists in the broader taxonomy but is not accepted at intake.
const VALID_TRUTH_LEVELS: &[&str] = &["L1", "L2", "L3"];

/// source_type → doc_family when the file does not state one.
const DOC_FAMILY_BY_SOURCE_TYPE: &[(&str, &str)] = &[
    ("gamme", "catalog"),
    ("guide", "guide"),
    ("diagnostic", "diagnostic"),
    ("faq", "knowledge"),
    ("policy", "knowledge"),
    ("general", "knowledge"),
];

/// Parsed frontmatter block, flat key/value.
#[derive(Debug, Clone, Default)]
pub struct Frontmatter {
    pub fields: BTreeMap<String, String>,
}

impl Frontmatter {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }
}

/// Result of validating one file's frontmatter. One reason per violation.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub reasons: Vec<String>,
    pub frontmatter: Frontmatter,
    /// Effective doc family (explicit or inferred), set on valid outcomes.
    pub doc_family: Option<String>,
}

/// Extracts the leading `---` block as flat `key: value` lines.
///
/// Quotes around values are stripped; `#` comment lines and `-` list markers
/// are ignored. A file without a frontmatter block yields an empty map.
pub fn parse(text: &str) -> Frontmatter {
    let mut fields = BTreeMap::new();
    let mut lines = text.lines();
    match lines.next() {
        Some(first) if first.trim() == "---" => {}
        _ => return Frontmatter { fields },
    }

    for line in lines {
        let trimmed = line.trim();
        if trimmed == "---" {
            break;
        }
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("- ") {
            continue;
        }
        if let Some((key, value)) = trimmed.split_once(':') {
            let key = key.trim().to_string();
            let value = value.trim().trim_matches('"').trim_matches('\'').to_string();
            if !key.is_empty() {
                fields.insert(key, value);
            }
        }
    }
    Frontmatter { fields }
}

/// Validates one file's frontmatter against the intake contract.
pub fn validate(text: &str) -> ValidationOutcome {
    let fm = parse(text);
    let mut reasons = Vec::new();

    for required in ["title", "source_type", "truth_level"] {
        if fm.get(required).map(|v| v.is_empty()).unwrap_or(true) {
            reasons.push(format!("MISSING_REQUIRED_FIELD: {}", required));
        }
    }

    let source_type = fm.get("source_type").unwrap_or_default();
    if !source_type.is_empty() && !VALID_SOURCE_TYPES.contains(&source_type) {
        reasons.push(format!("INVALID_SOURCE_TYPE: {}", source_type));
    }

    let truth_level = fm.get("truth_level").unwrap_or_default();
    if !truth_level.is_empty() && !VALID_TRUTH_LEVELS.contains(&truth_level) {
        reasons.push(format!("INVALID_TRUTH_LEVEL: {}", truth_level));
    }

    // doc_family may be stated or inferred from source_type; absent both
    // ways it is a missing required field.
    let explicit_family = fm.get("doc_family").filter(|v| !v.is_empty());
    let doc_family = match explicit_family {
        Some(family) => {
            if !VALID_DOC_FAMILIES.contains(&family) {
                reasons.push(format!("INVALID_DOC_FAMILY: {}", family));
                None
            } else {
                Some(family.to_string())
            }
        }
        None => {
            let inferred = DOC_FAMILY_BY_SOURCE_TYPE
                .iter()
                .find(|(st, _)| *st == source_type)
                .map(|(_, fam)| fam.to_string());
            if inferred.is_none() {
                reasons.push("MISSING_REQUIRED_FIELD: doc_family".to_string());
            }
            inferred
        }
    };

    let valid = reasons.is_empty();
    ValidationOutcome {
        valid,
        reasons,
        frontmatter: fm,
        doc_family: if valid { doc_family } else { None },
    }
}

/// One quarantined file with its preserved reason trail.
#[derive(Debug, Clone)]
pub struct QuarantineEntry {
    pub filename: String,
    pub original_path: PathBuf,
    pub reason: String,
    pub frontmatter: BTreeMap<String, String>,
    pub quarantined_at: DateTime<Utc>,
}

/// Outcome of screening one intake subdirectory.
#[derive(Debug)]
pub struct IntakeReport {
    pub valid_paths: Vec<PathBuf>,
    pub quarantined: Vec<QuarantineEntry>,
    pub total_examined: usize,
}

/// Screens freshly landed files in `<root>/<subdir>` before any reindex.
///
/// Files modified after the cutoff (default: the last 30 minutes) are
/// validated; invalid ones are moved into the quarantine directory under a
/// date-prefixed name with a sidecar reason log. Valid paths are returned
/// for downstream resolution and reindexing.
pub fn validate_intake_zone(
    knowledge: &KnowledgeConfig,
    subdir: &str,
    cutoff: Option<DateTime<Utc>>,
) -> Result<IntakeReport> {
    let zone = knowledge.root.join(subdir);
    let cutoff = cutoff.unwrap_or_else(|| Utc::now() - Duration::minutes(DEFAULT_INTAKE_WINDOW_MINUTES));
    let include = build_globset(&knowledge.include_globs)?;

    let mut report = IntakeReport {
        valid_paths: Vec::new(),
        quarantined: Vec::new(),
        total_examined: 0,
    };

    if !zone.exists() {
        return Ok(report);
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(&zone) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(&zone)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();
        if !include.is_match(&rel) {
            continue;
        }
        if modified_at(entry.path())? <= cutoff {
            continue;
        }
        candidates.push(entry.path().to_path_buf());
    }
    candidates.sort();
    report.total_examined = candidates.len();

    for path in candidates {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read intake file: {}", path.display()))?;
        let outcome = validate(&text);
        if outcome.valid {
            report.valid_paths.push(path);
        } else {
            let entry = quarantine_file(knowledge, &path, &outcome)?;
            warn!(
                file = %entry.filename,
                reason = %entry.reason,
                "intake file quarantined"
            );
            report.quarantined.push(entry);
        }
    }

    Ok(report)
}

/// Moves an invalid file into the quarantine directory and writes its
/// sidecar reason log.
fn quarantine_file(
    knowledge: &KnowledgeConfig,
    path: &Path,
    outcome: &ValidationOutcome,
) -> Result<QuarantineEntry> {
    let quarantine_dir = knowledge.quarantine_dir();
    std::fs::create_dir_all(&quarantine_dir)?;

    let now = Utc::now();
    let original_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unnamed".to_string());
    let mut target_name = format!("{}-{}", now.format("%Y-%m-%d"), original_name);
    if quarantine_dir.join(&target_name).exists() {
        target_name = format!("{}-{}-{}", now.format("%Y-%m-%d"), now.timestamp(), original_name);
    }
    let target = quarantine_dir.join(&target_name);

    std::fs::rename(path, &target)
        .with_context(|| format!("Failed to quarantine {}", path.display()))?;

    let reason = outcome.reasons.join("; ");
    let original_rel = path
        .strip_prefix(&knowledge.root)
        .unwrap_or(path)
        .to_path_buf();

    let details = outcome
        .frontmatter
        .fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("; ");
    let sidecar = format!(
        "quarantined_at: {}\noriginal_path: {}\nreason: {}\ndetails: {}\naction: moved to quarantine\n",
        now.to_rfc3339(),
        original_rel.display(),
        reason,
        details,
    );
    std::fs::write(target.with_extension("reason.txt"), sidecar)?;

    Ok(QuarantineEntry {
        filename: target_name,
        original_path: original_rel,
        reason,
        frontmatter: outcome.frontmatter.fields.clone(),
        quarantined_at: now,
    })
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)?.modified()?;
    let secs = modified
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    Ok(DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_else(Utc::now))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "---\ntitle: \"Disque de frein\"\nsource_type: gamme\ntruth_level: L1\n---\n\n# Disque\n";

    #[test]
    fn parses_flat_key_values_and_strips_quotes() {
        let fm = parse(VALID);
        assert_eq!(fm.get("title"), Some("Disque de frein"));
        assert_eq!(fm.get("source_type"), Some("gamme"));
    }

    #[test]
    fn ignores_comments_and_list_markers() {
        let fm = parse("---\n# a comment\ntitle: t\n- item\nsource_type: faq\n---\n");
        assert_eq!(fm.fields.len(), 2);
    }

    #[test]
    fn no_block_yields_empty_frontmatter() {
        assert!(parse("# Just a heading\n").fields.is_empty());
    }

    #[test]
    fn valid_file_infers_doc_family() {
        let outcome = validate(VALID);
        assert!(outcome.valid);
        assert_eq!(outcome.doc_family.as_deref(), Some("catalog"));
    }

    #[test]
    fn explicit_doc_family_wins_over_inference() {
        let text = "---\ntitle: t\nsource_type: general\ndoc_family: guide\ntruth_level: L2\n---\n";
        let outcome = validate(text);
        assert!(outcome.valid);
        assert_eq!(outcome.doc_family.as_deref(), Some("guide"));
    }

    #[test]
    fn missing_truth_level_reports_reason() {
        let outcome = validate("---\ntitle: t\nsource_type: gamme\n---\n");
        assert!(!outcome.valid);
        assert!(outcome
            .reasons
            .contains(&"MISSING_REQUIRED_FIELD: truth_level".to_string()));
    }

    #[test]
    fn l5_truth_level_is_invalid() {
        let outcome = validate("---\ntitle: t\nsource_type: gamme\ntruth_level: L5\n---\n");
        assert!(!outcome.valid);
        assert!(outcome.reasons.contains(&"INVALID_TRUTH_LEVEL: L5".to_string()));
    }

    #[test]
    fn l4_is_rejected_at_intake() {
        let outcome = validate("---\ntitle: t\nsource_type: general\ntruth_level: L4\n---\n");
        assert!(!outcome.valid);
        assert!(outcome.reasons.contains(&"INVALID_TRUTH_LEVEL: L4".to_string()));
    }

    #[test]
    fn unknown_source_type_collects_both_reasons() {
        let outcome = validate("---\ntitle: t\nsource_type: blog\ntruth_level: L1\n---\n");
        assert!(!outcome.valid);
        assert!(outcome.reasons.contains(&"INVALID_SOURCE_TYPE: blog".to_string()));
        // No family can be inferred from an unknown source_type either.
        assert!(outcome
            .reasons
            .contains(&"MISSING_REQUIRED_FIELD: doc_family".to_string()));
    }

    mod intake_zone {
        use super::*;
        use tempfile::TempDir;

        fn knowledge(root: &Path) -> KnowledgeConfig {
            KnowledgeConfig {
                root: root.to_path_buf(),
                intake_subdir: "intake".to_string(),
                quarantine_subdir: "quarantine".to_string(),
                gammes_subdir: "gammes".to_string(),
                diagnostics_subdir: "diagnostics".to_string(),
                include_globs: vec!["**/*.md".to_string()],
            }
        }

        #[test]
        fn splits_valid_from_quarantined_and_writes_sidecar() {
            let tmp = TempDir::new().unwrap();
            let knowledge = knowledge(tmp.path());
            let zone = tmp.path().join("intake");
            std::fs::create_dir_all(&zone).unwrap();
            std::fs::write(zone.join("good.md"), VALID).unwrap();
            std::fs::write(zone.join("bad.md"), "---\ntitle: t\nsource_type: gamme\n---\n")
                .unwrap();
            std::fs::write(zone.join("skipped.txt"), "not matched by globs").unwrap();

            let cutoff = Utc::now() - Duration::minutes(5);
            let report = validate_intake_zone(&knowledge, "intake", Some(cutoff)).unwrap();

            assert_eq!(report.total_examined, 2);
            assert_eq!(report.valid_paths.len(), 1);
            assert!(report.valid_paths[0].ends_with("good.md"));
            assert_eq!(report.quarantined.len(), 1);
            assert!(!zone.join("bad.md").exists());

            let entry = &report.quarantined[0];
            assert!(entry.reason.contains("MISSING_REQUIRED_FIELD: truth_level"));
            let quarantined_path = tmp.path().join("quarantine").join(&entry.filename);
            assert!(quarantined_path.exists());

            let sidecar =
                std::fs::read_to_string(quarantined_path.with_extension("reason.txt")).unwrap();
            assert!(sidecar.contains("original_path: intake/bad.md"));
            assert!(sidecar.contains("reason: MISSING_REQUIRED_FIELD: truth_level"));
            assert!(sidecar.contains("action: moved to quarantine"));
        }

        #[test]
        fn cutoff_excludes_old_files() {
            let tmp = TempDir::new().unwrap();
            let knowledge = knowledge(tmp.path());
            let zone = tmp.path().join("intake");
            std::fs::create_dir_all(&zone).unwrap();
            std::fs::write(zone.join("old.md"), VALID).unwrap();

            // A cutoff in the future excludes everything just written.
            let cutoff = Utc::now() + Duration::minutes(5);
            let report = validate_intake_zone(&knowledge, "intake", Some(cutoff)).unwrap();
            assert_eq!(report.total_examined, 0);
        }
    }
}
