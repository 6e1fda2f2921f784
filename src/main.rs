//! # Knowledge Gateway CLI (`kgw`)
//!
//! ```bash
//! kgw --config ./config/kgw.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kgw init` | Create the SQLite database and run schema migrations |
//! | `kgw serve` | Start the HTTP gateway and background sweeps |
//! | `kgw ingest <file>` | Run one document through the admission pipeline |
//! | `kgw cleanup` | Duplicate sweep over the corpus (dry by default) |
//! | `kgw validate-intake` | Screen the intake zone, quarantining bad files |
//! | `kgw resolve [files...]` | Resolve files to gamme aliases |
//! | `kgw classify <message>` | Classify a query and show its filters |

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use knowledge_gateway::config::{self, Config};
use knowledge_gateway::models::{Category, IngestDocument, TruthLevel};
use knowledge_gateway::retrieval::RetrievalClient;
use knowledge_gateway::{db, frontmatter, gammes, intent, migrate, pipeline, server};

/// Knowledge Gateway — admission control, ingestion jobs, and intent-aware
/// retrieval for a product knowledge corpus.
#[derive(Parser)]
#[command(
    name = "kgw",
    about = "Knowledge ingestion and retrieval gateway",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kgw.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Start the HTTP gateway server.
    ///
    /// Serves webhooks, job submission, search and chat; spawns the orphan
    /// job sweeper.
    Serve,

    /// Run one frontmattered markdown file through the admission pipeline.
    Ingest {
        /// Markdown file with a frontmatter block.
        file: PathBuf,

        /// Show the decision without writing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Archive duplicate active documents, keeping the earliest source per
    /// fingerprint group.
    Cleanup {
        /// Actually mutate; the default only reports.
        #[arg(long)]
        commit: bool,
    },

    /// Validate freshly landed intake files, quarantining invalid ones.
    ValidateIntake {
        /// Subdirectory under the knowledge root to screen.
        #[arg(long)]
        subdir: Option<String>,
    },

    /// Resolve markdown files to gamme aliases.
    ///
    /// Without arguments, falls back to a recent-modification scan of the
    /// knowledge root.
    Resolve {
        files: Vec<PathBuf>,
    },

    /// Classify a user message and print the retrieval filters it implies.
    Classify {
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { file, dry_run } => {
            run_ingest(&cfg, &file, dry_run).await?;
        }
        Commands::Cleanup { commit } => {
            let pool = db::connect(&cfg).await?;
            let report = pipeline::cleanup_duplicates(&pool, commit).await?;
            println!("cleanup {}", if commit { "(commit)" } else { "(dry)" });
            println!("  scanned: {}", report.scanned);
            println!("  duplicate groups: {}", report.duplicate_groups);
            println!("  archived: {}", report.archived);
            for action in &report.actions {
                println!("  {}", action);
            }
            println!("ok");
        }
        Commands::ValidateIntake { subdir } => {
            let subdir = subdir.unwrap_or_else(|| cfg.knowledge.intake_subdir.clone());
            let report = frontmatter::validate_intake_zone(&cfg.knowledge, &subdir, None)?;
            println!("validate-intake {}", subdir);
            println!("  examined: {}", report.total_examined);
            println!("  valid: {}", report.valid_paths.len());
            println!("  quarantined: {}", report.quarantined.len());
            for entry in &report.quarantined {
                println!("  {} — {}", entry.filename, entry.reason);
            }
            println!("ok");
        }
        Commands::Resolve { files } => {
            let retrieval = RetrievalClient::new(&cfg.retrieval)?;
            let map = gammes::resolve_gammes(&cfg.knowledge, Some(&retrieval), &files).await?;
            for (alias, paths) in &map {
                println!("{}", alias);
                for path in paths {
                    println!("  {}", path.display());
                }
            }
            let diagnostics = gammes::resolve_diagnostics(&cfg.knowledge, None)?;
            if !diagnostics.is_empty() {
                println!("diagnostics: {}", diagnostics.join(", "));
            }
        }
        Commands::Classify { message } => {
            let classifier = intent::IntentClassifier::new()?;
            let classification = classifier.classify(&message);
            let filters = intent::build_filters(classification.user_intent);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "intent": classification,
                    "filters": filters,
                }))?
            );
        }
    }

    Ok(())
}

/// Builds an [`IngestDocument`] from a frontmattered markdown file and runs
/// it through the admission pipeline.
async fn run_ingest(cfg: &Config, file: &PathBuf, dry_run: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let outcome = frontmatter::validate(&text);
    if !outcome.valid {
        bail!("invalid frontmatter: {}", outcome.reasons.join("; "));
    }
    let fm = &outcome.frontmatter;

    let truth_level = fm
        .get("truth_level")
        .and_then(TruthLevel::parse)
        .context("frontmatter truth_level missing after validation")?;
    let category = fm
        .get("category")
        .and_then(Category::parse)
        .or_else(|| outcome.doc_family.as_deref().and_then(Category::parse))
        .unwrap_or(Category::Knowledge);
    let domain = fm.get("domain").unwrap_or("general").to_string();

    let source = file
        .strip_prefix(&cfg.knowledge.root)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| {
            file.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        });

    let doc = IngestDocument {
        title: fm.get("title").unwrap_or_default().to_string(),
        content: text.clone(),
        source,
        truth_level,
        domain,
        category,
    };

    let pool = db::connect(cfg).await?;
    let decision = if dry_run {
        pipeline::decide(&pool, &doc).await?
    } else {
        pipeline::ingest(&pool, &doc).await?
    };
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}
