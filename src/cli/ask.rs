//! CLI `ask` command: run one task through the agent loop.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use ragent::agent::{Agent, AgentOutcome};
use ragent::config::{expand_tilde, RagentConfig};
use ragent::knowledge;

/// Answer `task`, print the answer, and optionally write it to a markdown file.
pub async fn ask(config: &RagentConfig, task: &str, output: Option<PathBuf>) -> Result<()> {
    let agent = Agent::connect(config).await.context("failed to start agent")?;

    let result = async {
        // An empty store (always the case for the memory backend) is filled
        // from the knowledge directory first.
        let knowledge_dir = expand_tilde(&config.retrieval.knowledge_dir);
        if agent.retriever().document_count().await? == 0 && knowledge_dir.is_dir() {
            let report =
                knowledge::ingest(agent.retriever(), &knowledge_dir, &config.retrieval).await?;
            tracing::info!(files = report.embedded_count, chunks = report.chunks, "knowledge loaded");
        }
        Ok::<_, anyhow::Error>(agent.run(task).await?)
    }
    .await;
    agent.close().await?;
    let outcome = result?;

    if outcome.retrieval_degraded {
        eprintln!("warning: embedding service unavailable, answer was produced without usable context");
    }
    println!("{}", outcome.answer);

    if let Some(path) = output {
        write_markdown(&path, task, &outcome).await?;
        eprintln!("answer written to {}", path.display());
    }
    Ok(())
}

async fn write_markdown(path: &Path, task: &str, outcome: &AgentOutcome) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let body = format!(
        "# {task}\n\n{}\n\n---\n\n_{} turn(s), {} tool call(s), {} context document(s)_\n",
        outcome.answer.trim(),
        outcome.turns,
        outcome.tool_calls,
        outcome.context_documents,
    );
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}
