//! MCP `check_knowledge_status` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `check_knowledge_status` MCP tool. It takes none.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct CheckKnowledgeStatusParams {}
