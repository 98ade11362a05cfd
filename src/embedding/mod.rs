//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait, a remote HTTP implementation
//! ([`remote::RemoteEmbeddingProvider`]), dimension normalization
//! ([`resize::resize`]), and the [`retriever::EmbeddingRetriever`] that ties a
//! provider to a [`VectorStore`](crate::store::VectorStore).
//!
//! Embedding is best-effort: when the provider fails, the retriever substitutes
//! a random vector of the right shape and marks the result
//! [`EmbeddingStatus::Degraded`] so callers can tell noise from low relevance.

pub mod remote;
pub mod resize;
pub mod retriever;

use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;

use crate::error::Result;

pub use remote::RemoteEmbeddingProvider;
pub use resize::resize;
pub use retriever::{EmbeddingRetriever, Retrieval};

/// Default dimensionality of stored vectors.
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// Implementations return the raw vector as produced by the model; the
/// retriever is responsible for resizing and normalization.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Identifier of the model behind this provider.
    fn model(&self) -> &str;
}

/// Whether a vector came from the model or from the failure fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EmbeddingStatus {
    Ok,
    Degraded { reason: String },
}

impl EmbeddingStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// A fixed-dimension vector plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub status: EmbeddingStatus,
}

impl Embedding {
    pub fn is_degraded(&self) -> bool {
        self.status.is_degraded()
    }
}

/// Vector of `dimensions` components drawn uniformly from `[-1, 1]`.
pub fn fallback_vector(dimensions: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dimensions).map(|_| rng.gen_range(-1.0f32..=1.0)).collect()
}

/// Create an embedding provider from config.
///
/// Only the remote HTTP provider exists; `request_format` selects the wire shape.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    let provider = RemoteEmbeddingProvider::new(config)?;
    Ok(Box::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_has_requested_shape_and_range() {
        let v = fallback_vector(384);
        assert_eq!(v.len(), 384);
        assert!(v.iter().all(|x| (-1.0..=1.0).contains(x)));
    }

    #[test]
    fn degraded_status_serializes_with_reason() {
        let status = EmbeddingStatus::Degraded {
            reason: "timeout".into(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["reason"], "timeout");
    }
}
