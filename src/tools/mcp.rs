//! MCP client transport built on `rmcp`.
//!
//! Spawns a tool server as a child process (stdio) or connects to one over
//! streamable HTTP, then lists and calls its tools.

use std::sync::RwLock;

use async_trait::async_trait;
use rmcp::model::CallToolRequestParam;
use rmcp::service::{Peer, RunningService};
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt};
use serde_json::{Map, Value};

use super::{empty_schema, ToolDescriptor, ToolOutput, ToolTransport};
use crate::config::ToolServerConfig;
use crate::error::{RagentError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpEndpoint {
    Stdio { command: String, args: Vec<String> },
    Http { url: String },
}

impl McpEndpoint {
    pub fn from_config(config: &ToolServerConfig) -> Result<Self> {
        match (&config.command, &config.url) {
            (Some(command), None) => Ok(Self::Stdio {
                command: command.clone(),
                args: config.args.clone(),
            }),
            (None, Some(url)) => Ok(Self::Http { url: url.clone() }),
            _ => Err(RagentError::InvalidInput(format!(
                "tool server '{}' needs exactly one of `command` or `url`",
                config.name
            ))),
        }
    }
}

pub struct McpTransport {
    endpoint: McpEndpoint,
    service: tokio::sync::Mutex<Option<RunningService<RoleClient, ()>>>,
    peer: RwLock<Option<Peer<RoleClient>>>,
}

impl McpTransport {
    pub fn new(endpoint: McpEndpoint) -> Self {
        Self {
            endpoint,
            service: tokio::sync::Mutex::new(None),
            peer: RwLock::new(None),
        }
    }

    fn peer(&self) -> Result<Peer<RoleClient>> {
        self.peer
            .read()
            .ok()
            .and_then(|p| p.clone())
            .ok_or(RagentError::NotReady {
                component: "mcp transport",
                state: "disconnected",
            })
    }

    async fn start(&self) -> Result<RunningService<RoleClient, ()>> {
        match &self.endpoint {
            McpEndpoint::Stdio { command, args } => {
                let mut cmd = tokio::process::Command::new(command);
                cmd.args(args);
                let transport = TokioChildProcess::new(cmd).map_err(|e| {
                    RagentError::Transport(format!("failed to spawn tool server '{command}': {e}"))
                })?;
                ().serve(transport)
                    .await
                    .map_err(|e| RagentError::Transport(format!("MCP handshake failed: {e}")))
            }
            McpEndpoint::Http { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());
                ().serve(transport)
                    .await
                    .map_err(|e| RagentError::Transport(format!("MCP handshake with {url} failed: {e}")))
            }
        }
    }
}

#[async_trait]
impl ToolTransport for McpTransport {
    async fn connect(&self) -> Result<Vec<ToolDescriptor>> {
        let service = self.start().await?;
        let peer = service.peer().clone();

        let tools = peer
            .list_all_tools()
            .await
            .map_err(|e| RagentError::Transport(format!("failed to list tools: {e}")))?;

        let descriptors = tools
            .iter()
            .filter_map(|tool| serde_json::to_value(tool).ok())
            .filter_map(|value| descriptor_from_value(&value))
            .collect();

        if let Ok(mut slot) = self.peer.write() {
            *slot = Some(peer);
        }
        *self.service.lock().await = Some(service);

        Ok(descriptors)
    }

    async fn call(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let peer = self.peer()?;
        let params: CallToolRequestParam = serde_json::from_value(serde_json::json!({
            "name": name,
            "arguments": arguments,
        }))?;

        let result = peer.call_tool(params).await.map_err(|e| RagentError::ToolExecutionFailed {
            tool: name.to_string(),
            message: e.to_string(),
        })?;

        Ok(output_from_result(serde_json::to_value(&result)?))
    }

    async fn shutdown(&self) -> Result<()> {
        if let Ok(mut slot) = self.peer.write() {
            slot.take();
        }
        if let Some(service) = self.service.lock().await.take() {
            service
                .cancel()
                .await
                .map_err(|e| RagentError::Transport(format!("failed to stop MCP client: {e}")))?;
        }
        Ok(())
    }
}

/// Read a descriptor out of a serialized MCP `Tool`.
fn descriptor_from_value(value: &Value) -> Option<ToolDescriptor> {
    Some(ToolDescriptor {
        name: value.get("name")?.as_str()?.to_string(),
        description: value
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        input_schema: value
            .get("inputSchema")
            .cloned()
            .unwrap_or_else(empty_schema),
    })
}

/// Flatten a serialized `CallToolResult` into a [`ToolOutput`].
///
/// Structured content wins; otherwise a single text item is parsed as JSON
/// when possible, several text items are joined, and anything else is kept raw.
fn output_from_result(value: Value) -> ToolOutput {
    let is_error = value
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let content = if let Some(structured) = value.get("structuredContent").filter(|v| !v.is_null()) {
        structured.clone()
    } else {
        let items = value
            .get("content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let texts: Vec<&str> = items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect();
        match texts.as_slice() {
            [] => Value::Array(items.clone()),
            [single] => serde_json::from_str(single).unwrap_or_else(|_| Value::String(single.to_string())),
            many => Value::String(many.join("\n")),
        }
    };

    ToolOutput { content, is_error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_from_config() {
        let stdio = ToolServerConfig {
            name: "weather".into(),
            command: Some("weather-mcp".into()),
            args: vec!["--stdio".into()],
            url: None,
        };
        assert_eq!(
            McpEndpoint::from_config(&stdio).unwrap(),
            McpEndpoint::Stdio {
                command: "weather-mcp".into(),
                args: vec!["--stdio".into()]
            }
        );

        let neither = ToolServerConfig {
            name: "broken".into(),
            ..Default::default()
        };
        assert!(McpEndpoint::from_config(&neither).is_err());
    }

    #[test]
    fn descriptor_reads_mcp_tool_fields() {
        let value = json!({
            "name": "web_search",
            "description": "Search the web",
            "inputSchema": {"type": "object", "properties": {"query": {"type": "string"}}}
        });
        let d = descriptor_from_value(&value).unwrap();
        assert_eq!(d.name, "web_search");
        assert_eq!(d.description, "Search the web");
        assert_eq!(d.input_schema["properties"]["query"]["type"], "string");

        let bare = descriptor_from_value(&json!({"name": "ping"})).unwrap();
        assert_eq!(bare.description, "");
        assert_eq!(bare.input_schema["type"], "object");
    }

    #[test]
    fn single_json_text_item_is_parsed() {
        let out = output_from_result(json!({
            "content": [{"type": "text", "text": "{\"temp\": 21}"}],
            "isError": false
        }));
        assert!(!out.is_error);
        assert_eq!(out.content, json!({"temp": 21}));
    }

    #[test]
    fn multiple_text_items_are_joined() {
        let out = output_from_result(json!({
            "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}],
            "isError": true
        }));
        assert!(out.is_error);
        assert_eq!(out.content, json!("a\nb"));
    }

    #[test]
    fn structured_content_wins() {
        let out = output_from_result(json!({
            "content": [{"type": "text", "text": "ignored"}],
            "structuredContent": {"ok": true}
        }));
        assert_eq!(out.content, json!({"ok": true}));
    }
}
