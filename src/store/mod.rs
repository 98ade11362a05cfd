//! Vector storage and cosine-similarity top-K search.
//!
//! [`VectorStore`] is the seam between the retriever and whatever holds the
//! vectors. [`InMemoryVectorStore`] is a flat list scanned linearly per query,
//! which is fine for small knowledge bases. [`SqliteVectorStore`] persists the
//! same records and ranks them inside SQLite with sqlite-vec. Larger corpora
//! belong behind an ANN-backed implementation of the same trait.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;

use crate::config::RagentConfig;
use crate::error::Result;

pub use memory::InMemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// Norms below this are treated as zero; similarity against them is 0.
pub const MIN_NORM: f32 = 1e-8;

/// A stored document chunk with its similarity to a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    pub text: String,
    pub score: f32,
    /// Where the chunk came from, e.g. a path relative to the knowledge directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Storage backend for (vector, text) records, each with an optional source.
///
/// Implementations must return results ordered by descending cosine
/// similarity, breaking ties by insertion order (earliest first).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Append a record with no source.
    async fn add(&self, vector: Vec<f32>, text: String) -> Result<()> {
        self.add_with_source(vector, text, None).await
    }

    /// Append a record. The first insert fixes the store's dimensionality.
    async fn add_with_source(
        &self,
        vector: Vec<f32>,
        text: String,
        source: Option<String>,
    ) -> Result<()>;

    /// Return up to `top_k` records most similar to `query`. A query whose
    /// length differs from the stored vectors is a `DimensionMismatch`.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize>;

    /// Release backing resources. Idempotent.
    async fn close(&self) -> Result<()>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Build the store selected by `[storage] backend`.
pub fn open_store(config: &RagentConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.storage.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryVectorStore::new())),
        "sqlite" => {
            let path = config.resolved_db_path();
            let store = SqliteVectorStore::open(&path, &config.embedding.model)
                .with_context(|| format!("failed to open vector store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown storage backend '{other}' (expected 'memory' or 'sqlite')"),
    }
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// `dot(a, b) / (|a| * |b|)`, or 0.0 when either vector has (near) zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < MIN_NORM || norm_b < MIN_NORM {
        return 0.0;
    }
    let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    dot / (norm_a * norm_b)
}

/// Score `records` (in insertion order) against `query` and keep the best `top_k`.
///
/// The sort is stable, so equal scores keep insertion order.
pub(crate) fn rank<'a, I>(query: &[f32], records: I, top_k: usize) -> Vec<ScoredDocument>
where
    I: IntoIterator<Item = (&'a [f32], &'a str, Option<&'a str>)>,
{
    if top_k == 0 {
        return Vec::new();
    }
    let mut scored: Vec<ScoredDocument> = records
        .into_iter()
        .map(|(vector, text, source)| ScoredDocument {
            text: text.to_string(),
            score: cosine_similarity(query, vector),
            source: source.map(str::to_string),
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_similarity_is_one() {
        let v = vec![0.3, -1.2, 4.5, 0.01];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let a = vec![1.0, 2.0];
        let b = vec![-1.0, -2.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_scores_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
        assert!(!cosine_similarity(&zero, &zero).is_nan());
    }

    #[test]
    fn rank_breaks_ties_by_insertion_order() {
        let same = vec![1.0, 0.0];
        let other = vec![0.0, 1.0];
        let records = vec![
            (other.as_slice(), "c", None),
            (same.as_slice(), "a", Some("notes.md")),
            (same.as_slice(), "b", None),
        ];
        let ranked = rank(&[1.0, 0.0], records, 10);
        let texts: Vec<&str> = ranked.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(ranked[0].source.as_deref(), Some("notes.md"));
    }

    #[test]
    fn rank_with_zero_top_k_is_empty() {
        let v = vec![1.0];
        assert!(rank(&[1.0], vec![(v.as_slice(), "x", None)], 0).is_empty());
    }
}
