//! Error taxonomy for the retrieval, tool, model, and agent layers.
//!
//! Failures local to one embedding or one tool call are absorbed by the caller
//! and turned into signals the model can see. Model channel failures are
//! terminal once the agent's retry budget is exhausted.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Stage of the agent loop in which a terminal failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Retrieving,
    Conversing,
    AwaitingTools,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::Retrieving => "retrieving",
            Self::Conversing => "conversing",
            Self::AwaitingTools => "awaiting_tools",
        })
    }
}

#[derive(Error, Debug)]
pub enum RagentError {
    #[error("embedding degraded: {0}")]
    EmbeddingDegraded(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool '{tool}' failed: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    #[error("model call to '{model}' failed after {message_count} messages: {reason}")]
    ModelCallFailed {
        model: String,
        message_count: usize,
        reason: String,
    },

    #[error("{component} is not ready (state: {state})")]
    NotReady {
        component: &'static str,
        state: &'static str,
    },

    #[error("vector has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("tool calls still awaiting results: {0:?}")]
    PendingToolCalls(Vec<String>),

    #[error("no pending tool call with id '{0}'")]
    UnknownToolCall(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model kept requesting tools after {0} turns")]
    TurnLimitExceeded(usize),

    #[error("operation cancelled")]
    Cancelled,

    #[error("agent failed while {stage}: {source}")]
    AgentFailed {
        stage: Stage,
        #[source]
        source: Box<RagentError>,
    },

    #[error("IO error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RagentError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ModelCallFailed { .. } | Self::Transport(_) | Self::MalformedResponse(_)
        )
    }

    /// Short machine-readable name, used in tool error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmbeddingDegraded(_) => "embedding_degraded",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::ToolExecutionFailed { .. } => "tool_execution_failed",
            Self::ModelCallFailed { .. } => "model_call_failed",
            Self::NotReady { .. } => "not_ready",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::PendingToolCalls(_) => "pending_tool_calls",
            Self::UnknownToolCall(_) => "unknown_tool_call",
            Self::Transport(_) => "transport",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Storage(_) => "storage",
            Self::InvalidInput(_) => "invalid_input",
            Self::TurnLimitExceeded(_) => "turn_limit_exceeded",
            Self::Cancelled => "cancelled",
            Self::AgentFailed { .. } => "agent_failed",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }

    pub(crate) fn at(self, stage: Stage) -> Self {
        match self {
            already @ Self::AgentFailed { .. } => already,
            other => Self::AgentFailed {
                stage,
                source: Box::new(other),
            },
        }
    }
}

impl From<reqwest::Error> for RagentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RagentError::MalformedResponse(err.to_string())
        } else {
            RagentError::Transport(err.to_string())
        }
    }
}

impl From<rusqlite::Error> for RagentError {
    fn from(err: rusqlite::Error) -> Self {
        RagentError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RagentError {
    fn from(err: serde_json::Error) -> Self {
        RagentError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for RagentError {
    fn from(err: std::io::Error) -> Self {
        RagentError::Io(err.to_string())
    }
}

impl From<tokio::task::JoinError> for RagentError {
    fn from(err: tokio::task::JoinError) -> Self {
        RagentError::Storage(format!("blocking task failed: {err}"))
    }
}

/// Result type alias for ragent operations
pub type Result<T> = std::result::Result<T, RagentError>;
