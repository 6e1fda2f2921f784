//! Resolution of ingested files to canonical gamme and diagnostic aliases.
//!
//! A gamme alias (e.g. `disque-de-frein`) is the stable key for
//! category-scoped knowledge. Freshly ingested files rarely state it
//! outright, so resolution layers five strategies from cheapest to most
//! speculative: canonical location, explicit frontmatter, category slug,
//! title containment, and finally a semantic-search probe of the content.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::KnowledgeConfig;
use crate::fingerprint::fold_diacritic;
use crate::frontmatter;
use crate::retrieval::RetrievalClient;

/// Window for the mtime-scan fallbacks.
const RECENT_WINDOW_MINUTES: i64 = 30;

/// Content sent to the semantic fallback probe.
const SNIPPET_CHARS: usize = 300;

/// Minimum slug length for a frontmatter category to count as an alias.
const MIN_CATEGORY_SLUG_LEN: usize = 3;

/// Category values too generic to identify a gamme.
const GENERIC_CATEGORIES: &[&str] = &[
    "pieces",
    "pieces-auto",
    "auto",
    "produits",
    "catalogue",
    "general",
    "autres",
];

/// Lowercases, folds diacritics, and maps every non-alphanumeric run to a
/// single hyphen.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_hyphen = false;
    for c in s.chars().flat_map(|c| c.to_lowercase()) {
        let c = fold_diacritic(c);
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    out
}

/// Strips exactly one trailing `s`. Known-weak for French plural forms
/// (`-aux`, `-eaux`); kept as-is deliberately.
fn strip_plural(s: &str) -> &str {
    s.strip_suffix('s').unwrap_or(s)
}

/// Removes trailing marketing/section decoration and one leading article
/// from a page title before slugification.
fn strip_title_noise(title: &str) -> String {
    let mut t = title.trim().to_lowercase();

    for sep in [" - ", " – ", " — ", " | "] {
        if let Some(idx) = t.find(sep) {
            t.truncate(idx);
        }
    }
    if t.trim_end().ends_with(')') {
        if let Some(open) = t.rfind('(') {
            t.truncate(open);
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        t = t.trim_end().to_string();
        for suffix in ["pas cher", "au meilleur prix", "en ligne", "achat"] {
            if let Some(stripped) = t.strip_suffix(suffix) {
                t = stripped.trim_end().to_string();
                changed = true;
            }
        }
        let without_digits = t.trim_end_matches(|c: char| c.is_ascii_digit());
        if let Some(stripped) = without_digits.trim_end().strip_suffix("section") {
            t = stripped.trim_end().to_string();
            changed = true;
        }
    }

    for article in ["les ", "le ", "la ", "l'", "un ", "une ", "des ", "du "] {
        if let Some(stripped) = t.strip_prefix(article) {
            t = stripped.to_string();
            break;
        }
    }
    t.trim().to_string()
}

/// Known aliases are the markdown file stems of the canonical gammes
/// directory, longest first so containment never prefers a short alias
/// embedded in a longer one.
fn known_aliases(knowledge: &KnowledgeConfig) -> Vec<String> {
    let mut aliases: Vec<String> = Vec::new();
    let dir = knowledge.gammes_dir();
    if let Ok(entries) = std::fs::read_dir(&dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|e| e == "md").unwrap_or(false) {
                if let Some(stem) = path.file_stem() {
                    aliases.push(stem.to_string_lossy().to_string());
                }
            }
        }
    }
    aliases.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    aliases
}

/// Resolves markdown files to gamme aliases.
///
/// `files` is the preferred input (the webhook's explicit list); when it is
/// empty, a recent-mtime scan of the knowledge root stands in. The result
/// maps alias → contributing files.
pub async fn resolve_gammes(
    knowledge: &KnowledgeConfig,
    retrieval: Option<&RetrievalClient>,
    files: &[PathBuf],
) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let candidates = if files.is_empty() {
        recent_markdown_files(knowledge)?
    } else {
        files.to_vec()
    };

    let aliases = known_aliases(knowledge);
    let gammes_dir = knowledge.gammes_dir();
    let mut resolved: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    for path in candidates {
        if path.extension().map(|e| e != "md").unwrap_or(true) {
            continue;
        }
        match resolve_file(knowledge, &gammes_dir, &aliases, &path, retrieval).await {
            Some(alias) => {
                debug!(file = %path.display(), %alias, "gamme resolved");
                resolved.entry(alias).or_default().push(path);
            }
            None => debug!(file = %path.display(), "no gamme resolved"),
        }
    }

    Ok(resolved)
}

async fn resolve_file(
    knowledge: &KnowledgeConfig,
    gammes_dir: &Path,
    aliases: &[String],
    path: &Path,
    retrieval: Option<&RetrievalClient>,
) -> Option<String> {
    // 1. A file living in the canonical directory IS its alias.
    if path.parent() == Some(gammes_dir) {
        return path.file_stem().map(|s| s.to_string_lossy().to_string());
    }

    let text = std::fs::read_to_string(path).ok()?;
    let fm = frontmatter::parse(&text);

    // 2. Explicit alias field, verbatim.
    for key in ["gamme", "alias"] {
        if let Some(value) = fm.get(key).filter(|v| !v.is_empty()) {
            return Some(value.to_string());
        }
    }

    // 3. Specific-enough category field, slugified.
    if let Some(category) = fm.get("category").filter(|v| !v.is_empty()) {
        let slug = slugify(category);
        if slug.len() >= MIN_CATEGORY_SLUG_LEN && !GENERIC_CATEGORIES.contains(&slug.as_str()) {
            return Some(slug);
        }
    }

    // 4. Title containment against known aliases, longest first. The
    // depluralized variants only strip a single trailing `s`.
    if let Some(title) = fm.get("title").filter(|v| !v.is_empty()) {
        let title_slug = slugify(&strip_title_noise(title));
        if !title_slug.is_empty() {
            for alias in aliases {
                if title_slug.contains(alias.as_str())
                    || title_slug.contains(strip_plural(alias))
                    || strip_plural(&title_slug).contains(alias.as_str())
                {
                    return Some(alias.clone());
                }
            }
        }
    }

    // 5. Semantic probe: if a top hit lives in the canonical directory, its
    // stem is the alias. Best-effort; failures only mean no resolution.
    if let Some(client) = retrieval {
        let body = strip_frontmatter_block(&text);
        let snippet: String = body.chars().take(SNIPPET_CHARS).collect();
        if !snippet.trim().is_empty() {
            match client.semantic_search(&snippet, 3).await {
                Ok(hits) => {
                    let prefix = format!("{}/", knowledge.gammes_subdir);
                    for hit in hits {
                        if let Some(rest) = hit.source.strip_prefix(&prefix) {
                            let stem = rest.strip_suffix(".md").unwrap_or(rest);
                            if !stem.contains('/') {
                                return Some(stem.to_string());
                            }
                        }
                    }
                }
                Err(e) => warn!(file = %path.display(), error = %e, "semantic gamme fallback failed"),
            }
        }
    }

    None
}

fn strip_frontmatter_block(text: &str) -> &str {
    let rest = match text.strip_prefix("---") {
        Some(rest) => rest,
        None => return text,
    };
    match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            after.trim_start_matches(['\r', '\n'])
        }
        None => text,
    }
}

/// Diagnostic slugs are resolved purely from filenames recently modified in
/// the diagnostics directory; their content is never parsed.
pub fn resolve_diagnostics(
    knowledge: &KnowledgeConfig,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<String>> {
    let cutoff = cutoff.unwrap_or_else(|| Utc::now() - Duration::minutes(RECENT_WINDOW_MINUTES));
    let dir = knowledge.diagnostics_dir();
    let mut slugs = Vec::new();
    if !dir.exists() {
        return Ok(slugs);
    }
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map(|e| e != "md").unwrap_or(true) {
            continue;
        }
        if modified_at(&path)? <= cutoff {
            continue;
        }
        if let Some(stem) = path.file_stem() {
            slugs.push(stem.to_string_lossy().to_string());
        }
    }
    slugs.sort();
    slugs.dedup();
    Ok(slugs)
}

/// Mtime-scan fallback over the knowledge root, quarantine excluded.
fn recent_markdown_files(knowledge: &KnowledgeConfig) -> Result<Vec<PathBuf>> {
    let cutoff = Utc::now() - Duration::minutes(RECENT_WINDOW_MINUTES);
    let quarantine = knowledge.quarantine_dir();
    let mut files = Vec::new();
    for entry in WalkDir::new(&knowledge.root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.starts_with(&quarantine) {
            continue;
        }
        if path.extension().map(|e| e != "md").unwrap_or(true) {
            continue;
        }
        if modified_at(path)? > cutoff {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)?.modified()?;
    let secs = modified
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    Ok(DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_else(Utc::now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, KnowledgeConfig) {
        let tmp = TempDir::new().unwrap();
        let knowledge = KnowledgeConfig {
            root: tmp.path().to_path_buf(),
            intake_subdir: "intake".to_string(),
            quarantine_subdir: "quarantine".to_string(),
            gammes_subdir: "gammes".to_string(),
            diagnostics_subdir: "diagnostics".to_string(),
            include_globs: vec!["**/*.md".to_string()],
        };
        let gammes = knowledge.gammes_dir();
        std::fs::create_dir_all(&gammes).unwrap();
        for alias in ["disque-de-frein", "plaquette-de-frein", "frein", "amortisseur"] {
            std::fs::write(gammes.join(format!("{}.md", alias)), "").unwrap();
        }
        std::fs::create_dir_all(tmp.path().join("intake/web")).unwrap();
        (tmp, knowledge)
    }

    #[test]
    fn slugify_folds_diacritics_and_hyphenates() {
        assert_eq!(slugify("Disque de frein ventilé !"), "disque-de-frein-ventile");
        assert_eq!(slugify("Courroie  --  d'accessoire"), "courroie-d-accessoire");
    }

    #[test]
    fn title_noise_stripping() {
        assert_eq!(
            strip_title_noise("Les disques de frein - achat en ligne pas cher"),
            "disques de frein"
        );
        assert_eq!(strip_title_noise("Plaquettes (section 2)"), "plaquettes");
        assert_eq!(strip_title_noise("Amortisseur section 3"), "amortisseur");
    }

    #[tokio::test]
    async fn file_in_canonical_directory_uses_stem() {
        let (_tmp, knowledge) = setup();
        let path = knowledge.gammes_dir().join("disque-de-frein.md");
        let map = resolve_gammes(&knowledge, None, &[path.clone()]).await.unwrap();
        assert_eq!(map.get("disque-de-frein"), Some(&vec![path]));
    }

    #[tokio::test]
    async fn explicit_alias_field_wins_over_title_match() {
        let (tmp, knowledge) = setup();
        let path = tmp.path().join("intake/web/page.md");
        // Title would slug-match "plaquette-de-frein"; the alias field
        // names a different gamme and must win.
        std::fs::write(
            &path,
            "---\ntitle: Plaquette de frein avant\ngamme: disque-de-frein\n---\ncorps\n",
        )
        .unwrap();
        let map = resolve_gammes(&knowledge, None, &[path]).await.unwrap();
        assert!(map.contains_key("disque-de-frein"));
        assert!(!map.contains_key("plaquette-de-frein"));
    }

    #[tokio::test]
    async fn specific_category_is_slugified() {
        let (tmp, knowledge) = setup();
        let path = tmp.path().join("intake/web/page.md");
        std::fs::write(
            &path,
            "---\ntitle: Guide\ncategory: Courroie de distribution\n---\ncorps\n",
        )
        .unwrap();
        let map = resolve_gammes(&knowledge, None, &[path]).await.unwrap();
        assert!(map.contains_key("courroie-de-distribution"));
    }

    #[tokio::test]
    async fn generic_category_falls_through_to_title() {
        let (tmp, knowledge) = setup();
        let path = tmp.path().join("intake/web/page.md");
        std::fs::write(
            &path,
            "---\ntitle: Le disque de frein ventilé - pas cher\ncategory: pieces\n---\ncorps\n",
        )
        .unwrap();
        let map = resolve_gammes(&knowledge, None, &[path]).await.unwrap();
        // Longest-first: "disque-de-frein" is preferred over bare "frein".
        assert!(map.contains_key("disque-de-frein"), "got: {:?}", map.keys());
    }

    #[tokio::test]
    async fn depluralized_title_matches_singular_alias() {
        let (tmp, knowledge) = setup();
        let path = tmp.path().join("intake/web/page.md");
        std::fs::write(&path, "---\ntitle: Les amortisseurs\n---\ncorps\n").unwrap();
        let map = resolve_gammes(&knowledge, None, &[path]).await.unwrap();
        assert!(map.contains_key("amortisseur"), "got: {:?}", map.keys());
    }

    #[tokio::test]
    async fn unresolvable_file_is_absent_from_map() {
        let (tmp, knowledge) = setup();
        let path = tmp.path().join("intake/web/page.md");
        std::fs::write(&path, "---\ntitle: Mentions légales\n---\ncorps\n").unwrap();
        let map = resolve_gammes(&knowledge, None, &[path]).await.unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn multiple_files_accumulate_under_one_alias() {
        let (tmp, knowledge) = setup();
        let a = tmp.path().join("intake/web/a.md");
        let b = tmp.path().join("intake/web/b.md");
        for p in [&a, &b] {
            std::fs::write(p, "---\ntitle: x\ngamme: amortisseur\n---\n").unwrap();
        }
        let map = resolve_gammes(&knowledge, None, &[a, b]).await.unwrap();
        assert_eq!(map.get("amortisseur").map(|v| v.len()), Some(2));
    }

    #[test]
    fn diagnostics_resolve_from_recent_filenames() {
        let (_tmp, knowledge) = setup();
        let dir = knowledge.diagnostics_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bruit-freinage.md"), "x").unwrap();
        std::fs::write(dir.join("voyant-moteur.md"), "x").unwrap();
        std::fs::write(dir.join("notes.txt"), "x").unwrap();

        let old_cutoff = Utc::now() - Duration::minutes(5);
        let slugs = resolve_diagnostics(&knowledge, Some(old_cutoff)).unwrap();
        assert_eq!(slugs, vec!["bruit-freinage", "voyant-moteur"]);

        let future_cutoff = Utc::now() + Duration::minutes(5);
        assert!(resolve_diagnostics(&knowledge, Some(future_cutoff)).unwrap().is_empty());
    }
}
