//! Semantic Search Adapter
//!
//! Similarity query against the vector-indexed text collaborator. Passages
//! below the minimum similarity threshold are discarded entirely rather
//! than returned with a low score — low-confidence material feeding the
//! phrasing layer is how hallucinations start. Timeouts and errors degrade
//! to an empty result set.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::types::PassageResult;

/// Vector similarity collaborator: query text plus optional project scope,
/// returns ranked passages with similarity in [0, 1].
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn similar(
        &self,
        query: &str,
        project_scope: Option<Uuid>,
        top_k: usize,
    ) -> Result<Vec<PassageResult>>;
}

pub struct SemanticSearchAdapter {
    store: Arc<dyn VectorStore>,
    top_k: usize,
    min_similarity: f32,
    timeout: Duration,
}

impl SemanticSearchAdapter {
    pub fn new(
        store: Arc<dyn VectorStore>,
        top_k: usize,
        min_similarity: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            top_k,
            min_similarity,
            timeout,
        }
    }

    pub async fn search(&self, query: &str, project_scope: Option<Uuid>) -> Vec<PassageResult> {
        let outcome = tokio::time::timeout(
            self.timeout,
            self.store.similar(query, project_scope, self.top_k),
        )
        .await;
        let mut passages = match outcome {
            Ok(Ok(passages)) => passages,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "semantic search failed, degrading to empty result");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "semantic search timed out");
                return Vec::new();
            }
        };
        passages.retain(|p| p.similarity >= self.min_similarity);
        passages.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        passages.truncate(self.top_k);
        passages
    }
}
