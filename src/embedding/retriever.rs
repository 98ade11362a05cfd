//! Embedding + storage + retrieval facade.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::{create_provider, fallback_vector, resize, Embedding, EmbeddingProvider, EmbeddingStatus};
use crate::config::RagentConfig;
use crate::error::{RagentError, Result};
use crate::store::{open_store, ScoredDocument, VectorStore};

/// Result of a similarity query.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub documents: Vec<ScoredDocument>,
    /// Status of the query embedding. When degraded, the ranking is noise.
    pub status: EmbeddingStatus,
}

impl Retrieval {
    pub fn texts(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.text.as_str()).collect()
    }

    /// Join the retrieved texts into a single context block. Documents with a
    /// known source are prefixed with `[source: ...]` so answers can cite them.
    pub fn context(&self, separator: &str) -> String {
        self.documents
            .iter()
            .map(|d| match &d.source {
                Some(source) => format!("[source: {source}]\n{}", d.text),
                None => d.text.clone(),
            })
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Mean similarity of the returned documents, 0.0 when nothing matched.
    pub fn relevance_score(&self) -> f32 {
        if self.documents.is_empty() {
            return 0.0;
        }
        self.documents.iter().map(|d| d.score).sum::<f32>() / self.documents.len() as f32
    }
}

/// Produces fixed-dimension vectors through a remote provider and delegates
/// storage and search to a [`VectorStore`] it owns.
pub struct EmbeddingRetriever {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    dimensions: usize,
    timeout: Duration,
    retries: u32,
}

impl EmbeddingRetriever {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        dimensions: usize,
    ) -> Self {
        Self {
            provider,
            store,
            dimensions,
            timeout: Duration::from_secs(30),
            retries: 1,
        }
    }

    /// Remote provider plus the configured store, with the configured call policy.
    pub fn from_config(config: &RagentConfig) -> anyhow::Result<Self> {
        let provider: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let store = open_store(config)?;
        Ok(Self::new(provider, store, config.embedding.dimensions).with_call_policy(
            Duration::from_secs(config.embedding.timeout_secs),
            config.embedding.retries,
        ))
    }

    /// Per-attempt timeout and number of extra attempts after the first.
    pub fn with_call_policy(mut self, timeout: Duration, retries: u32) -> Self {
        self.timeout = timeout;
        self.retries = retries;
        self
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Embed `text`, store the vector alongside it, and return the vector.
    ///
    /// Degraded vectors are stored too; the returned status says so.
    pub async fn embed_document(&self, text: &str) -> Result<Embedding> {
        self.embed_document_from(text, None).await
    }

    /// [`embed_document`](Self::embed_document), recording where `text` came from.
    pub async fn embed_document_from(&self, text: &str, source: Option<&str>) -> Result<Embedding> {
        let embedding = self.embed_query(text).await;
        self.store
            .add_with_source(
                embedding.vector.clone(),
                text.to_string(),
                source.map(str::to_string),
            )
            .await?;
        Ok(embedding)
    }

    /// Embed `text` without storing it. Never fails: provider errors yield a
    /// random fallback vector with a degraded status.
    pub async fn embed_query(&self, text: &str) -> Embedding {
        match self.embed_remote(text).await {
            Ok(vector) => Embedding {
                vector: resize(vector, self.dimensions),
                status: EmbeddingStatus::Ok,
            },
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    model = %self.provider.model(),
                    dimensions = self.dimensions,
                    "embedding failed, substituting random fallback vector"
                );
                Embedding {
                    vector: fallback_vector(self.dimensions),
                    status: EmbeddingStatus::Degraded {
                        reason: err.to_string(),
                    },
                }
            }
        }
    }

    /// Embed `query` and return the `top_k` most similar stored texts.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Retrieval> {
        let embedding = self.embed_query(query).await;
        let documents = self.store.search(&embedding.vector, top_k).await?;
        tracing::debug!(
            matched = documents.len(),
            top_k,
            degraded = embedding.is_degraded(),
            "retrieval complete"
        );
        Ok(Retrieval {
            documents,
            status: embedding.status,
        })
    }

    pub async fn document_count(&self) -> Result<usize> {
        self.store.len().await
    }

    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }

    async fn embed_remote(&self, text: &str) -> Result<Vec<f32>> {
        let mut last_error = RagentError::EmbeddingDegraded("no attempt made".into());
        for attempt in 0..=self.retries {
            match tokio::time::timeout(self.timeout, self.provider.embed(text)).await {
                Ok(Ok(vector)) => return Ok(vector),
                Ok(Err(err)) => last_error = err,
                Err(_) => {
                    last_error = RagentError::EmbeddingDegraded(format!(
                        "embedding call timed out after {:?}",
                        self.timeout
                    ))
                }
            }
            if attempt < self.retries {
                tracing::warn!(attempt, error = %last_error, "retrying embedding call");
            }
        }
        Err(last_error)
    }
}
