//! Client for the external retrieval/AI service.
//!
//! Every call goes through the shared circuit breaker: `guard()` before the
//! attempt, then exactly one of `success()`/`failure()`. Rejections issued
//! by the breaker itself surface as [`RetrievalError::Unavailable`] and are
//! not fed back into the failure count.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::breaker::CircuitBreaker;
use crate::config::RetrievalConfig;
use crate::intent::RetrievalFilters;

/// The single error kind for external-service interaction. Call sites can
/// tell a breaker rejection apart from a service failure; only the latter
/// counts against the breaker.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("external service unavailable: circuit open")]
    Unavailable,
    #[error("retrieval service error: {0}")]
    Service(String),
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct SearchHit {
    pub source: String,
    pub score: f64,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct Answer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SearchHit>,
}

pub struct RetrievalClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    breaker: CircuitBreaker,
}

impl RetrievalClient {
    pub fn new(config: &RetrievalConfig) -> anyhow::Result<Self> {
        Self::with_breaker(config, CircuitBreaker::new())
    }

    pub fn with_breaker(config: &RetrievalConfig, breaker: CircuitBreaker) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_key = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                anyhow::anyhow!("environment variable {} not set (retrieval.api_key_env)", var)
            })?),
            None => None,
        };
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            breaker,
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Semantic search over the published corpus.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        #[derive(Deserialize)]
        struct Hits {
            hits: Vec<SearchHit>,
        }
        let body = json!({ "query": query, "limit": limit });
        let value = self.post_json("/v1/search", body).await?;
        let hits: Hits = serde_json::from_value(value)
            .map_err(|e| RetrievalError::Service(format!("malformed search response: {}", e)))?;
        Ok(hits.hits)
    }

    /// Intent-filtered question answering.
    pub async fn answer(
        &self,
        question: &str,
        filters: &RetrievalFilters,
    ) -> Result<Answer, RetrievalError> {
        let body = json!({
            "question": question,
            "truth_levels": filters.truth_levels.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            "categories": filters
                .categories
                .as_ref()
                .map(|cats| cats.iter().map(|c| c.as_str()).collect::<Vec<_>>()),
        });
        let value = self.post_json("/v1/answer", body).await?;
        serde_json::from_value(value)
            .map_err(|e| RetrievalError::Service(format!("malformed answer response: {}", e)))
    }

    /// Asks the service to reindex the given knowledge files. The worker on
    /// the service side holds the advisory index lock for the duration.
    pub async fn reindex(&self, paths: &[String]) -> Result<(), RetrievalError> {
        let body = json!({ "paths": paths });
        self.post_json("/v1/reindex", body).await?;
        Ok(())
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, RetrievalError> {
        self.breaker
            .guard()
            .map_err(|_| RetrievalError::Unavailable)?;

        let result = self.try_post(path, body).await;
        match &result {
            Ok(_) => self.breaker.success(),
            Err(_) => self.breaker.failure(),
        }
        result
    }

    async fn try_post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, RetrievalError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "calling retrieval service");
        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        let response = request
            .send()
            .await
            .map_err(|e| RetrievalError::Service(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Service(format!(
                "HTTP {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(serde_json::Value::Null);
        }
        response
            .json()
            .await
            .map_err(|e| RetrievalError::Service(format!("invalid JSON response: {}", e)))
    }
}
