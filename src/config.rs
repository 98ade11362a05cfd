use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RagentConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub model: ModelConfig,
    pub retrieval: RetrievalConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// `"memory"` or `"sqlite"`.
    pub backend: String,
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub dimensions: usize,
    /// `"content"` sends `{content}`; `"openai"` sends `{model, input}`.
    pub request_format: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub separator: String,
    pub knowledge_dir: String,
    pub extensions: Vec<String>,
    pub chunk_size: usize,
    pub relevance_threshold: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub system_prompt: Option<String>,
    pub max_turns: usize,
    pub max_model_retries: u32,
    pub retry_backoff_ms: u64,
    pub tool_timeout_secs: u64,
    pub tool_retries: u32,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ToolsConfig {
    pub servers: Vec<ToolServerConfig>,
}

/// One external MCP tool server. Either `command` (stdio child process) or
/// `url` (streamable HTTP) must be set.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ToolServerConfig {
    pub name: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 8001,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_ragent_dir()
            .join("knowledge.db")
            .to_string_lossy()
            .into_owned();
        Self {
            backend: "memory".into(),
            db_path,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/embedding".into(),
            model: "text-embedding-3-small".into(),
            dimensions: 384,
            request_format: "content".into(),
            api_key: None,
            timeout_secs: 30,
            retries: 1,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/v1/chat/completions".into(),
            model: "llama3".into(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 1000,
            connect_timeout_secs: 10,
            timeout_secs: 300,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            separator: "\n\n---\n\n".into(),
            knowledge_dir: "knowledge".into(),
            extensions: vec!["md".into(), "txt".into(), "json".into(), "csv".into()],
            chunk_size: 1000,
            relevance_threshold: 0.3,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: Some(
                "You are a helpful assistant. Answer using the provided context and the \
                 available tools. Cite which source each fact came from."
                    .into(),
            ),
            max_turns: 25,
            max_model_retries: 2,
            retry_backoff_ms: 500,
            tool_timeout_secs: 60,
            tool_retries: 1,
        }
    }
}

/// Returns `~/.ragent/`, or `./.ragent` when there is no home directory.
pub fn default_ragent_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ragent")
}

/// Returns the default config file path: `~/.ragent/config.toml`
pub fn default_config_path() -> PathBuf {
    default_ragent_dir().join("config.toml")
}

impl RagentConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            RagentConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides. This is the only place the
    /// process environment is consulted.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RAGENT_DB") {
            self.storage.db_path = val;
            self.storage.backend = "sqlite".into();
        }
        if let Ok(val) = std::env::var("RAGENT_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("RAGENT_EMBEDDING_URL") {
            self.embedding.endpoint = val;
        }
        if let Ok(val) = std::env::var("RAGENT_MODEL_URL") {
            self.model.endpoint = val;
        }
        if let Ok(val) = std::env::var("RAGENT_MODEL") {
            self.model.model = val;
        }
        if let Ok(val) = std::env::var("RAGENT_API_KEY") {
            self.model.api_key = Some(val.clone());
            self.embedding.api_key.get_or_insert(val);
        }
        if let Ok(val) = std::env::var("RAGENT_TOP_K") {
            match val.parse() {
                Ok(k) => self.retrieval.top_k = k,
                Err(_) => tracing::warn!(value = %val, "ignoring non-numeric RAGENT_TOP_K"),
            }
        }
        if let Ok(val) = std::env::var("RAGENT_KNOWLEDGE_DIR") {
            self.retrieval.knowledge_dir = val;
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be greater than zero"
        );
        anyhow::ensure!(self.agent.max_turns > 0, "agent.max_turns must be at least 1");
        for server in &self.tools.servers {
            anyhow::ensure!(
                server.command.is_some() != server.url.is_some(),
                "tool server '{}' needs exactly one of `command` or `url`",
                server.name
            );
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
