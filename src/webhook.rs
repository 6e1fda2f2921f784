//! Out-of-band completion handling.
//!
//! A webhook (or a locally finished job, which reuses the same path) reports
//! that an ingestion job reached a terminal state. Failed jobs are audited
//! and nothing else. Done jobs trigger gamme and diagnostic resolution and
//! a completion event for downstream content-refresh collaborators. The
//! audit trail is best-effort: a failed write is logged and swallowed, it
//! never blocks the response or the event.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::KnowledgeConfig;
use crate::events::EventBus;
use crate::gammes;
use crate::models::{
    CompletionEvent, JobStatus, ValidationSummary, WebhookAuditRecord, WebhookPayload, now_epoch,
};
use crate::retrieval::RetrievalClient;

/// Signature header checked when a webhook secret is configured.
pub const SIGNATURE_HEADER: &str = "x-kgw-signature";

pub struct CompletionHandler {
    pool: SqlitePool,
    knowledge: KnowledgeConfig,
    retrieval: Arc<RetrievalClient>,
    events: EventBus,
}

/// What the caller gets back; mirrors the audit row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CompletionResponse {
    pub job_id: String,
    pub event_emitted: bool,
    pub affected_gammes: Vec<String>,
    pub affected_diagnostics: Vec<String>,
}

impl CompletionHandler {
    pub fn new(
        pool: SqlitePool,
        knowledge: KnowledgeConfig,
        retrieval: Arc<RetrievalClient>,
        events: EventBus,
    ) -> Self {
        Self {
            pool,
            knowledge,
            retrieval,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Processes one completion signal end to end.
    pub async fn handle(
        &self,
        payload: &WebhookPayload,
        validation: Option<ValidationSummary>,
    ) -> Result<CompletionResponse> {
        let started = Instant::now();

        if payload.status == JobStatus::Failed {
            let record = WebhookAuditRecord {
                job_id: payload.job_id.clone(),
                source: payload.source,
                status: payload.status,
                files_created: payload.files_created.clone(),
                gammes: Vec::new(),
                diagnostics: Vec::new(),
                event_emitted: false,
                error: Some("job reported failed".to_string()),
                duration_ms: started.elapsed().as_millis() as i64,
            };
            self.write_audit_best_effort(&record).await;
            return Ok(CompletionResponse {
                job_id: payload.job_id.clone(),
                event_emitted: false,
                affected_gammes: Vec::new(),
                affected_diagnostics: Vec::new(),
            });
        }

        // Relative paths are joined with the knowledge root; the explicit
        // file list is preferred and the mtime scan only kicks in when the
        // webhook listed nothing.
        let files: Vec<PathBuf> = payload
            .files_created
            .iter()
            .map(|f| {
                let p = PathBuf::from(f);
                if p.is_absolute() {
                    p
                } else {
                    self.knowledge.root.join(p)
                }
            })
            .collect();

        let gammes_map =
            gammes::resolve_gammes(&self.knowledge, Some(self.retrieval.as_ref()), &files).await?;
        let diagnostics = gammes::resolve_diagnostics(&self.knowledge, None)?;

        let affected_gammes: Vec<String> = gammes_map.keys().cloned().collect();
        let affected_gammes_map = gammes_map
            .iter()
            .map(|(alias, paths)| {
                (
                    alias.clone(),
                    paths
                        .iter()
                        .map(|p| {
                            p.strip_prefix(&self.knowledge.root)
                                .unwrap_or(p)
                                .to_string_lossy()
                                .to_string()
                        })
                        .collect(),
                )
            })
            .collect();

        let event = CompletionEvent {
            job_id: payload.job_id.clone(),
            source: payload.source,
            status: payload.status,
            completed_at: now_epoch(),
            affected_gammes: affected_gammes.clone(),
            affected_gammes_map,
            affected_diagnostics: if diagnostics.is_empty() {
                None
            } else {
                Some(diagnostics.clone())
            },
            validation_summary: validation,
        };
        self.events.emit(event);

        let record = WebhookAuditRecord {
            job_id: payload.job_id.clone(),
            source: payload.source,
            status: payload.status,
            files_created: payload.files_created.clone(),
            gammes: affected_gammes.clone(),
            diagnostics: diagnostics.clone(),
            event_emitted: true,
            error: None,
            duration_ms: started.elapsed().as_millis() as i64,
        };
        self.write_audit_best_effort(&record).await;

        info!(
            job_id = %payload.job_id,
            gammes = affected_gammes.len(),
            diagnostics = diagnostics.len(),
            "completion handled"
        );

        Ok(CompletionResponse {
            job_id: payload.job_id.clone(),
            event_emitted: true,
            affected_gammes,
            affected_diagnostics: diagnostics,
        })
    }

    async fn write_audit_best_effort(&self, record: &WebhookAuditRecord) {
        if let Err(e) = write_audit(&self.pool, record).await {
            warn!(job_id = %record.job_id, error = %e, "audit write failed; continuing");
        }
    }
}

pub async fn write_audit(pool: &SqlitePool, record: &WebhookAuditRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO webhook_audit (id, job_id, source, status, files_created, gammes,
            diagnostics, event_emitted, error, duration_ms, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&record.job_id)
    .bind(record.source.as_str())
    .bind(record.status.as_str())
    .bind(serde_json::to_string(&record.files_created)?)
    .bind(serde_json::to_string(&record.gammes)?)
    .bind(serde_json::to_string(&record.diagnostics)?)
    .bind(record.event_emitted)
    .bind(&record.error)
    .bind(record.duration_ms)
    .bind(now_epoch())
    .execute(pool)
    .await?;
    Ok(())
}

/// Verifies an HMAC-SHA256 hex signature over the raw webhook body.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Produces the hex signature a sender would attach. Used by tests and by
/// operators debugging webhook delivery.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_roundtrip_and_mismatch() {
        let body = br#"{"job_id":"j1"}"#;
        let sig = sign_body("secret", body);
        assert!(verify_signature("secret", body, &sig));
        assert!(!verify_signature("other", body, &sig));
        assert!(!verify_signature("secret", b"tampered", &sig));
        assert!(!verify_signature("secret", body, "not-hex"));
    }
}
