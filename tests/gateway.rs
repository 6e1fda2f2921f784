//! End-to-end scenarios over a temporary knowledge tree and an in-memory
//! store: admission decisions across jobs, webhook completion handling, and
//! the audit trail.

use std::path::Path;
use std::sync::Arc;

use sqlx::SqlitePool;
use tempfile::TempDir;

use knowledge_gateway::config::{KnowledgeConfig, RetrievalConfig};
use knowledge_gateway::events::EventBus;
use knowledge_gateway::migrate;
use knowledge_gateway::models::{
    Category, IngestDocument, JobKind, JobStatus, TruthLevel, Verdict, WebhookPayload,
};
use knowledge_gateway::pipeline;
use knowledge_gateway::retrieval::RetrievalClient;
use knowledge_gateway::webhook::CompletionHandler;

async fn memory_pool() -> SqlitePool {
    let pool = knowledge_gateway::db::connect_memory().await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    pool
}

fn knowledge_tree(root: &Path) -> KnowledgeConfig {
    let knowledge = KnowledgeConfig {
        root: root.to_path_buf(),
        intake_subdir: "intake".to_string(),
        quarantine_subdir: "quarantine".to_string(),
        gammes_subdir: "gammes".to_string(),
        diagnostics_subdir: "diagnostics".to_string(),
        include_globs: vec!["**/*.md".to_string()],
    };
    std::fs::create_dir_all(knowledge.gammes_dir()).unwrap();
    std::fs::create_dir_all(root.join("intake/web")).unwrap();
    knowledge
}

/// A retrieval client pointed at a dead endpoint: resolution layers 1–4
/// must succeed without ever reaching the semantic fallback.
fn offline_retrieval() -> Arc<RetrievalClient> {
    Arc::new(
        RetrievalClient::new(&RetrievalConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            api_key_env: None,
        })
        .unwrap(),
    )
}

#[tokio::test]
async fn duplicate_across_jobs_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let knowledge = knowledge_tree(tmp.path());
    let pool = memory_pool().await;

    // The canonical gamme file for the first job.
    let gamme_text = "---\ntitle: Disque de frein\nsource_type: gamme\ntruth_level: L1\n---\nDisque de frein, ventilé!\n";
    std::fs::write(knowledge.gammes_dir().join("disque-de-frein.md"), gamme_text).unwrap();

    // First document: accepted.
    let first = IngestDocument {
        title: "Disque de frein".to_string(),
        content: "Disque de frein, ventilé!".to_string(),
        source: "gammes/disque-de-frein.md".to_string(),
        truth_level: TruthLevel::L1,
        domain: "freinage".to_string(),
        category: Category::Catalog,
    };
    let d1 = pipeline::ingest(&pool, &first).await.unwrap();
    assert_eq!(d1.verdict, Verdict::AcceptUpsert);

    let first_id: String = sqlx::query_scalar("SELECT id FROM documents WHERE parent_source = ?")
        .bind(&d1.parent_source)
        .fetch_one(&pool)
        .await
        .unwrap();

    // Second document, same normalized content from a web extraction.
    let second = IngestDocument {
        title: "Disque de frein".to_string(),
        content: "disque   de freinventile".to_string(),
        source: "web/disque-frein-section.md".to_string(),
        truth_level: TruthLevel::L3,
        domain: "freinage".to_string(),
        category: Category::Knowledge,
    };
    let d2 = pipeline::ingest(&pool, &second).await.unwrap();
    assert_eq!(d2.verdict, Verdict::ArchiveAsDuplicate);
    assert_eq!(d2.duplicate_of.as_deref(), Some(first_id.as_str()));

    // Completion handling for both jobs.
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let handler = CompletionHandler::new(
        pool.clone(),
        knowledge.clone(),
        offline_retrieval(),
        events,
    );

    let first_completion = handler
        .handle(
            &WebhookPayload {
                job_id: "job-1".to_string(),
                source: JobKind::Pdf,
                status: JobStatus::Done,
                files_created: vec!["gammes/disque-de-frein.md".to_string()],
            },
            None,
        )
        .await
        .unwrap();
    assert!(first_completion.event_emitted);
    assert_eq!(first_completion.affected_gammes, vec!["disque-de-frein"]);

    // The web job's file carries a title that resolves to the same alias.
    let web_file = tmp.path().join("intake/web/disque-frein-section.md");
    std::fs::write(
        &web_file,
        "---\ntitle: Disque de frein\nsource_type: general\ntruth_level: L3\n---\ndisque   de freinventile\n",
    )
    .unwrap();

    let second_completion = handler
        .handle(
            &WebhookPayload {
                job_id: "job-2".to_string(),
                source: JobKind::Web,
                status: JobStatus::Done,
                files_created: vec!["intake/web/disque-frein-section.md".to_string()],
            },
            None,
        )
        .await
        .unwrap();
    assert!(second_completion.event_emitted);
    // No newly affected aliases beyond what the first job already produced.
    for alias in &second_completion.affected_gammes {
        assert!(
            first_completion.affected_gammes.contains(alias),
            "unexpected new alias {}",
            alias
        );
    }

    // Both completion events went out on the bus.
    let e1 = rx.try_recv().unwrap();
    assert_eq!(e1.job_id, "job-1");
    let e2 = rx.try_recv().unwrap();
    assert_eq!(e2.job_id, "job-2");
    assert_eq!(e2.affected_gammes, vec!["disque-de-frein"]);

    // Audit trail has both deliveries marked emitted.
    let emitted: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM webhook_audit WHERE event_emitted = 1",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(emitted, 2);
}

#[tokio::test]
async fn failed_webhook_audits_without_resolving_or_emitting() {
    let tmp = TempDir::new().unwrap();
    let knowledge = knowledge_tree(tmp.path());
    let pool = memory_pool().await;

    let events = EventBus::new();
    let mut rx = events.subscribe();
    let handler = CompletionHandler::new(
        pool.clone(),
        knowledge.clone(),
        offline_retrieval(),
        events,
    );

    let response = handler
        .handle(
            &WebhookPayload {
                job_id: "job-x".to_string(),
                source: JobKind::Web,
                status: JobStatus::Failed,
                files_created: vec![],
            },
            None,
        )
        .await
        .unwrap();

    assert!(!response.event_emitted);
    assert!(response.affected_gammes.is_empty());
    assert!(rx.try_recv().is_err(), "no event may be emitted for a failed job");

    let (emitted, status): (bool, String) = sqlx::query_as(
        "SELECT event_emitted, status FROM webhook_audit WHERE job_id = 'job-x'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(!emitted);
    assert_eq!(status, "failed");
}

#[tokio::test]
async fn webhook_prefers_explicit_file_list_over_scan() {
    let tmp = TempDir::new().unwrap();
    let knowledge = knowledge_tree(tmp.path());
    let pool = memory_pool().await;
    std::fs::write(knowledge.gammes_dir().join("plaquette-de-frein.md"), "").unwrap();
    std::fs::write(knowledge.gammes_dir().join("amortisseur.md"), "").unwrap();

    let handler = CompletionHandler::new(
        pool.clone(),
        knowledge.clone(),
        offline_retrieval(),
        EventBus::new(),
    );

    // Only the listed file may contribute, even though another recently
    // modified gamme file exists on disk.
    let response = handler
        .handle(
            &WebhookPayload {
                job_id: "job-y".to_string(),
                source: JobKind::Pdf,
                status: JobStatus::Done,
                files_created: vec!["gammes/amortisseur.md".to_string()],
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(response.affected_gammes, vec!["amortisseur"]);
}
