//! MCP `search_knowledge_base` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_knowledge_base` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchKnowledgeBaseParams {
    /// Natural language query to embed and match against stored chunks.
    #[schemars(description = "Natural language query to search the knowledge base")]
    pub query: String,

    /// Number of results to return (1-20). Defaults to the configured top_k.
    #[schemars(
        description = "Number of results to return (1-20). Defaults to the server's configured top_k."
    )]
    pub top_k: Option<usize>,
}
