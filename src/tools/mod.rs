//! Clients for external tool-execution servers.
//!
//! A [`ToolClient`] owns one [`ToolTransport`] (an MCP server over stdio or
//! streamable HTTP in production, a fake in tests), discovers its tools once,
//! and forwards calls. A [`Toolbox`] routes tool names across several clients.

pub mod mcp;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ToolsConfig;
use crate::error::{RagentError, Result};

pub use mcp::{McpEndpoint, McpTransport};

/// A tool as advertised by its server. Read-only after discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Raw result of a tool invocation, success or remote error payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub content: Value,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(content: Value) -> Self {
        Self {
            content,
            is_error: true,
        }
    }
}

/// Connection to one tool server.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Establish the connection and return the server's tool list.
    async fn connect(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke `name` with `arguments`. Transport failures are `Err`; errors
    /// reported by the tool itself come back as `ToolOutput { is_error: true }`.
    async fn call(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput>;

    /// Tear the connection down.
    async fn shutdown(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Connecting,
    Connected,
    Closed,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

/// Bridge to a single tool server: `Uninitialized → Connected → Closed`.
pub struct ToolClient {
    name: String,
    transport: Arc<dyn ToolTransport>,
    state: Mutex<ClientState>,
    tools: RwLock<HashMap<String, ToolDescriptor>>,
    order: RwLock<Vec<String>>,
}

impl ToolClient {
    pub fn new(name: impl Into<String>, transport: Arc<dyn ToolTransport>) -> Self {
        Self {
            name: name.into(),
            transport,
            state: Mutex::new(ClientState::Uninitialized),
            tools: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ClientState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ClientState::Closed)
    }

    fn not_ready(state: ClientState) -> RagentError {
        RagentError::NotReady {
            component: "tool client",
            state: state.as_str(),
        }
    }

    /// Connect to the server and cache its tool list.
    ///
    /// A `close()` that lands while the connection is being established wins:
    /// the fresh connection is shut down and `init` reports `NotReady`.
    pub async fn init(&self) -> Result<()> {
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| Self::not_ready(ClientState::Closed))?;
            if *state != ClientState::Uninitialized {
                return Err(Self::not_ready(*state));
            }
            *state = ClientState::Connecting;
        }

        let descriptors = match self.transport.connect().await {
            Ok(descriptors) => descriptors,
            Err(err) => {
                self.transition(ClientState::Connecting, ClientState::Uninitialized);
                return Err(err);
            }
        };

        {
            let mut tools = self
                .tools
                .write()
                .map_err(|_| RagentError::Storage("tool cache lock poisoned".into()))?;
            let mut order = self
                .order
                .write()
                .map_err(|_| RagentError::Storage("tool cache lock poisoned".into()))?;
            for descriptor in descriptors {
                if !tools.contains_key(&descriptor.name) {
                    order.push(descriptor.name.clone());
                }
                tools.insert(descriptor.name.clone(), descriptor);
            }
        }

        if !self.transition(ClientState::Connecting, ClientState::Connected) {
            self.transport.shutdown().await?;
            tracing::info!(server = %self.name, "tool client closed while connecting");
            return Err(Self::not_ready(ClientState::Closed));
        }

        tracing::info!(server = %self.name, tools = self.tool_count(), "tool server connected");
        Ok(())
    }

    /// Move `from → to` atomically. Returns false if the state was not `from`.
    fn transition(&self, from: ClientState, to: ClientState) -> bool {
        match self.state.lock() {
            Ok(mut state) if *state == from => {
                *state = to;
                true
            }
            _ => false,
        }
    }

    fn tool_count(&self) -> usize {
        self.tools.read().map(|t| t.len()).unwrap_or_default()
    }

    /// Cached descriptors in discovery order.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        let (Ok(tools), Ok(order)) = (self.tools.read(), self.order.read()) else {
            return Vec::new();
        };
        order.iter().filter_map(|name| tools.get(name).cloned()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools
            .read()
            .map(|t| t.contains_key(name))
            .unwrap_or(false)
    }

    /// Forward a call. Fails fast with `NotReady` unless connected and with
    /// `ToolNotFound` for names the server never advertised.
    pub async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let state = self.state();
        if state != ClientState::Connected {
            return Err(Self::not_ready(state));
        }
        if !self.has_tool(name) {
            return Err(RagentError::ToolNotFound(name.to_string()));
        }

        tracing::debug!(server = %self.name, tool = %name, "calling tool");
        self.transport
            .call(name, arguments)
            .await
            .map_err(|err| match err {
                RagentError::ToolExecutionFailed { .. } => err,
                other => RagentError::ToolExecutionFailed {
                    tool: name.to_string(),
                    message: other.to_string(),
                },
            })
    }

    /// Release the transport. Safe to call repeatedly or before `init`.
    pub async fn close(&self) -> Result<()> {
        let previous = {
            let Ok(mut state) = self.state.lock() else {
                return Ok(());
            };
            std::mem::replace(&mut *state, ClientState::Closed)
        };

        if previous == ClientState::Connected {
            self.transport.shutdown().await?;
            tracing::info!(server = %self.name, "tool server disconnected");
        }
        Ok(())
    }
}

/// Routes tool names to the client that advertised them. When two servers
/// advertise the same name, the one registered first wins.
#[derive(Default)]
pub struct Toolbox {
    clients: Vec<Arc<ToolClient>>,
}

impl Toolbox {
    pub fn new(clients: Vec<Arc<ToolClient>>) -> Self {
        Self { clients }
    }

    /// One MCP-backed client per `[[tools.servers]]` entry, not yet initialized.
    pub fn from_config(config: &ToolsConfig) -> Result<Self> {
        let clients = config
            .servers
            .iter()
            .map(|server| {
                let endpoint = mcp::McpEndpoint::from_config(server)?;
                let transport: Arc<dyn ToolTransport> = Arc::new(McpTransport::new(endpoint));
                Ok(Arc::new(ToolClient::new(server.name.clone(), transport)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(clients))
    }

    pub fn clients(&self) -> &[Arc<ToolClient>] {
        &self.clients
    }

    /// Initialize every client, stopping at the first unreachable server.
    /// On failure every client is closed, including those already connected.
    pub async fn init(&self) -> Result<()> {
        for client in &self.clients {
            if let Err(err) = client.init().await {
                tracing::warn!(server = %client.name(), error = %err, "tool server init failed");
                if let Err(close_err) = self.close().await {
                    tracing::warn!(error = %close_err, "failed to release tool servers after init failure");
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// All descriptors across clients, deduplicated by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut seen = std::collections::HashSet::new();
        self.clients
            .iter()
            .flat_map(|c| c.list_tools())
            .filter(|d| seen.insert(d.name.clone()))
            .collect()
    }

    pub async fn call(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput> {
        match self.clients.iter().find(|c| c.has_tool(name)) {
            Some(client) => client.call_tool(name, arguments).await,
            None => Err(RagentError::ToolNotFound(name.to_string())),
        }
    }

    /// Close every client, reporting the first failure after trying them all.
    pub async fn close(&self) -> Result<()> {
        let mut first_error = None;
        for client in &self.clients {
            if let Err(err) = client.close().await {
                tracing::warn!(server = %client.name(), error = %err, "failed to close tool client");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
