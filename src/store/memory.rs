//! In-memory flat vector store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{rank, ScoredDocument, VectorStore};
use crate::error::{RagentError, Result};

/// A stored (vector, text) pair. Immutable once inserted.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub text: String,
    pub vector: Vec<f32>,
    pub source: Option<String>,
}

/// Flat list of records behind a reader-writer lock: searches share the lock,
/// `add` takes it exclusively so no search sees a half-appended record.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    records: RwLock<Vec<EmbeddingRecord>>,
    closed: AtomicBool,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RagentError::NotReady {
                component: "vector store",
                state: "closed",
            });
        }
        Ok(())
    }

    fn poisoned() -> RagentError {
        RagentError::Storage("vector store lock poisoned".into())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_with_source(
        &self,
        vector: Vec<f32>,
        text: String,
        source: Option<String>,
    ) -> Result<()> {
        self.ensure_open()?;
        if vector.is_empty() {
            return Err(RagentError::InvalidInput("cannot store an empty vector".into()));
        }
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        if let Some(first) = records.first() {
            if first.vector.len() != vector.len() {
                return Err(RagentError::DimensionMismatch {
                    expected: first.vector.len(),
                    actual: vector.len(),
                });
            }
        }
        records.push(EmbeddingRecord {
            text,
            vector,
            source,
        });
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        self.ensure_open()?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        if let Some(first) = records.first() {
            if first.vector.len() != query.len() {
                return Err(RagentError::DimensionMismatch {
                    expected: first.vector.len(),
                    actual: query.len(),
                });
            }
        }
        Ok(rank(
            query,
            records
                .iter()
                .map(|r| (r.vector.as_slice(), r.text.as_str(), r.source.as_deref())),
            top_k,
        ))
    }

    async fn len(&self) -> Result<usize> {
        self.ensure_open()?;
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.len())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            if let Ok(mut records) = self.records.write() {
                records.clear();
            }
            tracing::debug!("in-memory vector store closed");
        }
        Ok(())
    }
}
