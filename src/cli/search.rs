use anyhow::Result;

use ragent::config::RagentConfig;
use ragent::embedding::EmbeddingRetriever;

/// Run a similarity search from the terminal.
pub async fn search(config: &RagentConfig, query: &str, top_k: Option<usize>) -> Result<()> {
    let retriever = EmbeddingRetriever::from_config(config)?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let retrieval = retriever.retrieve(query, top_k).await?;
    retriever.close().await?;

    if retrieval.status.is_degraded() {
        println!("WARNING: embedding service unavailable, results below are arbitrary.\n");
    }
    if retrieval.documents.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!(
        "Found {} result(s) (relevance: {:.2})\n",
        retrieval.documents.len(),
        retrieval.relevance_score()
    );

    for (i, doc) in retrieval.documents.iter().enumerate() {
        let preview: String = doc.text.chars().take(120).collect();
        let ellipsis = if doc.text.chars().count() > 120 { "..." } else { "" };
        println!("  {}. (score: {:.4})", i + 1, doc.score);
        println!("     {preview}{ellipsis}");
        println!();
    }

    Ok(())
}
