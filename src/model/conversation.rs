//! Conversation state on top of a [`ChatBackend`].

use std::sync::Arc;

use super::{ChatBackend, ChatRequest, ChatResponse, Message};
use crate::error::{RagentError, Result};
use crate::tools::ToolDescriptor;

/// Owns the ordered message history for one conversation.
///
/// History only grows. A failed or dropped `chat` leaves it exactly as it was
/// before the call, so the caller can retry the same prompt.
pub struct ConversationalModel {
    model_id: String,
    backend: Arc<dyn ChatBackend>,
    tools: Vec<ToolDescriptor>,
    history: Vec<Message>,
    /// Ids of tool calls from the last assistant turn still missing a result.
    pending: Vec<String>,
}

impl ConversationalModel {
    pub fn new(
        model_id: impl Into<String>,
        backend: Arc<dyn ChatBackend>,
        system_prompt: Option<&str>,
        tools: Vec<ToolDescriptor>,
    ) -> Self {
        let history = system_prompt
            .filter(|p| !p.trim().is_empty())
            .map(|p| vec![Message::system(p)])
            .unwrap_or_default();

        Self {
            model_id: model_id.into(),
            backend,
            tools,
            history,
            pending: Vec::new(),
        }
    }

    /// Add retrieved context ahead of the first user turn.
    pub fn with_context(mut self, context: &str) -> Self {
        if !context.trim().is_empty() {
            self.history.push(Message::user(format!(
                "Relevant context from the knowledge base:\n\n{context}"
            )));
        }
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn pending_tool_calls(&self) -> &[String] {
        &self.pending
    }

    /// Send `prompt` (if any) plus the whole history and record the reply.
    ///
    /// `None` continues the conversation after tool results were appended.
    pub async fn chat(&mut self, prompt: Option<&str>) -> Result<ChatResponse> {
        if !self.pending.is_empty() {
            return Err(RagentError::PendingToolCalls(self.pending.clone()));
        }

        let mut messages = self.history.clone();
        if let Some(prompt) = prompt {
            messages.push(Message::user(prompt));
        }

        let request = ChatRequest {
            model: &self.model_id,
            messages: &messages,
            tools: &self.tools,
        };
        let response = match self.backend.complete(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(model = %self.model_id, messages = messages.len(), error = %err, "model call failed");
                return Err(match err {
                    already @ RagentError::ModelCallFailed { .. } => already,
                    other => RagentError::ModelCallFailed {
                        model: self.model_id.clone(),
                        message_count: messages.len(),
                        reason: other.to_string(),
                    },
                });
            }
        };

        self.history = messages;
        self.history.push(Message::assistant(
            response.content.clone(),
            response.tool_calls.clone(),
        ));
        self.pending = response.tool_calls.iter().map(|c| c.id.clone()).collect();

        tracing::debug!(
            model = %self.model_id,
            history = self.history.len(),
            tool_calls = response.tool_calls.len(),
            "model turn recorded"
        );
        Ok(response)
    }

    /// Record the output of the pending tool call `tool_call_id`.
    pub fn append_tool_result(&mut self, tool_call_id: &str, output: impl Into<String>) -> Result<()> {
        let Some(index) = self.pending.iter().position(|id| id == tool_call_id) else {
            return Err(RagentError::UnknownToolCall(tool_call_id.to_string()));
        };
        self.pending.remove(index);
        self.history.push(Message::tool_result(tool_call_id, output));
        Ok(())
    }
}
