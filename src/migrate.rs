use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Knowledge documents admitted (or quarantined/archived) by the pipeline
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            parent_source TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            truth_level TEXT NOT NULL,
            domain TEXT NOT NULL,
            category TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            status TEXT NOT NULL,
            retrievable INTEGER NOT NULL DEFAULT 1,
            duplicate_of TEXT,
            quarantine_reason TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(parent_source)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Ingestion jobs; rows past expires_at are invisible to reads and purged
    // by the sweep
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            finished_at INTEGER,
            return_code INTEGER,
            log TEXT NOT NULL DEFAULT '[]',
            source_url TEXT,
            truth_level TEXT,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Single-flight markers: one row per job kind that enforces it
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_locks (
            kind TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            acquired_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only webhook audit trail
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webhook_audit (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            source TEXT NOT NULL,
            status TEXT NOT NULL,
            files_created TEXT NOT NULL DEFAULT '[]',
            gammes TEXT NOT NULL DEFAULT '[]',
            diagnostics TEXT NOT NULL DEFAULT '[]',
            event_emitted INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            duration_ms INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_domain ON documents(domain, status)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_fingerprint ON documents(fingerprint, status)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, updated_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_job_id ON webhook_audit(job_id)")
        .execute(pool)
        .await?;

    Ok(())
}
