use std::path::PathBuf;

use anyhow::{Context, Result};

use ragent::config::{expand_tilde, RagentConfig};
use ragent::embedding::EmbeddingRetriever;
use ragent::knowledge;

/// Embed every knowledge file into the configured store.
pub async fn ingest(config: &RagentConfig, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| expand_tilde(&config.retrieval.knowledge_dir));
    if config.storage.backend == "memory" {
        eprintln!("note: storage backend is 'memory', ingested vectors are dropped on exit");
    }

    let retriever = EmbeddingRetriever::from_config(config)?;
    let report = knowledge::ingest(&retriever, &dir, &config.retrieval)
        .await
        .with_context(|| format!("failed to ingest {}", dir.display()))?;
    retriever.close().await?;

    println!(
        "Embedded {} of {} file(s) from {} ({} chunk(s))",
        report.embedded_count,
        report.total_files,
        dir.display(),
        report.chunks
    );
    if report.degraded_chunks > 0 {
        println!(
            "WARNING: {} chunk(s) stored with fallback vectors; the embedding service was unreachable.",
            report.degraded_chunks
        );
    }
    for path in &report.failed_files {
        println!("  failed: {}", path.display());
    }
    Ok(())
}
