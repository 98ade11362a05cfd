use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde_json::{json, Value};

use super::add_document::AddDocumentParams;
use super::check_knowledge_status::CheckKnowledgeStatusParams;
use super::search_knowledge_base::SearchKnowledgeBaseParams;
use crate::config::RagentConfig;
use crate::embedding::{EmbeddingRetriever, Retrieval};
use crate::knowledge::chunk_text;

/// Longest snippet returned per search hit, in characters.
const SNIPPET_CHARS: usize = 300;
const MAX_TOP_K: usize = 20;

/// The knowledge-base MCP tool handler. Every HTTP session gets its own
/// clone; the retriever and the update timestamp are shared.
#[derive(Clone)]
pub struct KnowledgeTools {
    tool_router: ToolRouter<Self>,
    retriever: Arc<EmbeddingRetriever>,
    config: Arc<RagentConfig>,
    last_updated: Arc<RwLock<Option<DateTime<Utc>>>>,
}

#[tool_router]
impl KnowledgeTools {
    pub fn new(
        retriever: Arc<EmbeddingRetriever>,
        config: Arc<RagentConfig>,
        last_updated: Arc<RwLock<Option<DateTime<Utc>>>>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            retriever,
            config,
            last_updated,
        }
    }

    /// Semantic search over the stored chunks.
    #[tool(description = "Search the knowledge base for information relevant to a query. Returns the best matching passages with similarity scores and an overall relevance_score; a low score means the knowledge base probably does not cover the question.")]
    async fn search_knowledge_base(
        &self,
        Parameters(params): Parameters<SearchKnowledgeBaseParams>,
    ) -> Result<String, String> {
        let query = params.query.trim();
        if query.is_empty() {
            return Err("query must not be empty".into());
        }
        let top_k = params
            .top_k
            .unwrap_or(self.config.retrieval.top_k)
            .clamp(1, MAX_TOP_K);

        tracing::info!(query = %query, top_k, "search_knowledge_base called");

        let retrieval = self
            .retriever
            .retrieve(query, top_k)
            .await
            .map_err(|e| format!("search failed: {e}"))?;

        let response = format_search(query, &retrieval, self.config.retrieval.relevance_threshold);
        tracing::info!(
            results = retrieval.documents.len(),
            relevance = retrieval.relevance_score(),
            "knowledge base search complete"
        );
        Ok(response.to_string())
    }

    /// Report whether anything has been ingested.
    #[tool(description = "Check the knowledge base status: 'ready' or 'empty', the number of stored chunks, and when content was last added.")]
    async fn check_knowledge_status(
        &self,
        Parameters(_params): Parameters<CheckKnowledgeStatusParams>,
    ) -> Result<String, String> {
        let count = self
            .retriever
            .document_count()
            .await
            .map_err(|e| format!("status check failed: {e}"))?;
        let last_updated = self
            .last_updated
            .read()
            .ok()
            .and_then(|t| *t)
            .map(|t| t.to_rfc3339());

        tracing::info!(document_count = count, "check_knowledge_status called");
        Ok(json!({
            "status": if count > 0 { "ready" } else { "empty" },
            "document_count": count,
            "last_updated": last_updated,
        })
        .to_string())
    }

    /// Embed and store new content.
    #[tool(description = "Add a document to the knowledge base. Long content is split into chunks, each embedded and stored.")]
    async fn add_document(
        &self,
        Parameters(params): Parameters<AddDocumentParams>,
    ) -> Result<String, String> {
        if params.content.trim().is_empty() {
            return Err("content must not be empty".into());
        }

        let chunks = if params.chunk.unwrap_or(true) {
            chunk_text(&params.content, self.config.retrieval.chunk_size)
        } else {
            vec![params.content.trim().to_string()]
        };

        tracing::info!(content_len = params.content.len(), chunks = chunks.len(), "add_document called");

        let mut degraded = 0;
        for chunk in &chunks {
            let embedding = self
                .retriever
                .embed_document_from(chunk, params.source.as_deref())
                .await
                .map_err(|e| format!("store failed: {e}"))?;
            if embedding.is_degraded() {
                degraded += 1;
            }
        }

        if let Ok(mut last) = self.last_updated.write() {
            *last = Some(Utc::now());
        }

        Ok(json!({
            "status": "stored",
            "chunks": chunks.len(),
            "degraded_chunks": degraded,
        })
        .to_string())
    }
}

#[tool_handler]
impl ServerHandler for KnowledgeTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Knowledge-base server. Use search_knowledge_base to find passages, \
                 check_knowledge_status to see whether anything is indexed, and \
                 add_document to index new text."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(SNIPPET_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Search response body. `relevant` compares the mean score with `threshold`.
pub fn format_search(query: &str, retrieval: &Retrieval, threshold: f32) -> Value {
    let results: Vec<Value> = retrieval
        .documents
        .iter()
        .map(|doc| {
            json!({
                "source": doc.source.as_deref().unwrap_or("Unknown"),
                "content": snippet(&doc.text),
                "score": doc.score,
            })
        })
        .collect();
    let relevance = retrieval.relevance_score();

    json!({
        "query": query,
        "results": results,
        "total_results": retrieval.documents.len(),
        "relevance_score": relevance,
        "relevant": relevance >= threshold && !retrieval.status.is_degraded(),
        "degraded": retrieval.status.is_degraded(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingStatus;
    use crate::store::ScoredDocument;

    fn retrieval(scores: &[f32], status: EmbeddingStatus) -> Retrieval {
        Retrieval {
            documents: scores
                .iter()
                .map(|&score| ScoredDocument {
                    text: "x".repeat(400),
                    score,
                    source: None,
                })
                .collect(),
            status,
        }
    }

    #[test]
    fn long_results_are_truncated() {
        let body = format_search("q", &retrieval(&[0.9], EmbeddingStatus::Ok), 0.3);
        let content = body["results"][0]["content"].as_str().unwrap();
        assert_eq!(content.chars().count(), SNIPPET_CHARS + 3);
        assert!(content.ends_with("..."));
        assert_eq!(body["total_results"], 1);
    }

    #[test]
    fn relevance_respects_threshold_and_degradation() {
        let low = format_search("q", &retrieval(&[0.1, 0.2], EmbeddingStatus::Ok), 0.3);
        assert_eq!(low["relevant"], false);

        let high = format_search("q", &retrieval(&[0.8, 0.6], EmbeddingStatus::Ok), 0.3);
        assert_eq!(high["relevant"], true);

        let degraded = format_search(
            "q",
            &retrieval(&[0.8], EmbeddingStatus::Degraded { reason: "down".into() }),
            0.3,
        );
        assert_eq!(degraded["relevant"], false);
        assert_eq!(degraded["degraded"], true);
    }

    #[test]
    fn results_name_their_source() {
        let mut cited = retrieval(&[0.9, 0.4], EmbeddingStatus::Ok);
        cited.documents[0].source = Some("notes/extra.txt".into());
        let body = format_search("q", &cited, 0.3);
        assert_eq!(body["results"][0]["source"], "notes/extra.txt");
        assert_eq!(body["results"][1]["source"], "Unknown");
    }

    #[test]
    fn short_snippet_is_unchanged() {
        assert_eq!(snippet("Treatment includes eye protection."), "Treatment includes eye protection.");
    }
}
