//! The retrieval + tool-calling control loop.
//!
//! One [`Agent::run`] walks `Idle → Retrieving → Conversing ⇄ AwaitingTools`
//! and ends in `Done` or `Failed`. Tool failures are written back into the
//! conversation for the model to see; model channel failures are retried with
//! exponential backoff and become terminal once the budget is spent.
//!
//! Every external call races against [`Agent::close`], so closing from another
//! task unblocks a run that is waiting on a hung dependency.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::{watch, OnceCell};

use crate::config::{AgentConfig, RagentConfig};
use crate::embedding::EmbeddingRetriever;
use crate::error::{RagentError, Result, Stage};
use crate::model::{ChatBackend, ChatResponse, ConversationalModel, Message, OpenAiChatBackend, ToolCall};
use crate::tools::{ToolDescriptor, ToolOutput, Toolbox};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Retrieving,
    Conversing,
    AwaitingTools,
    Done,
    Failed,
}

/// Loop limits and retry policy for one agent.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub system_prompt: Option<String>,
    pub top_k: usize,
    pub separator: String,
    pub max_turns: usize,
    pub max_model_retries: u32,
    pub retry_backoff: Duration,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub tool_retries: u32,
}

impl AgentSettings {
    pub fn from_config(config: &RagentConfig) -> Self {
        let AgentConfig {
            system_prompt,
            max_turns,
            max_model_retries,
            retry_backoff_ms,
            tool_timeout_secs,
            tool_retries,
        } = config.agent.clone();

        Self {
            model: config.model.model.clone(),
            system_prompt,
            top_k: config.retrieval.top_k,
            separator: config.retrieval.separator.clone(),
            max_turns,
            max_model_retries,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            model_timeout: Duration::from_secs(config.model.timeout_secs),
            tool_timeout: Duration::from_secs(tool_timeout_secs),
            tool_retries,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&RagentConfig::default())
    }
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    pub answer: String,
    /// Model turns taken, including the final one.
    pub turns: usize,
    pub tool_calls: usize,
    pub context_documents: usize,
    pub relevance_score: f32,
    /// The query embedding fell back to a random vector, so the context is noise.
    pub retrieval_degraded: bool,
    pub transcript: Vec<Message>,
}

pub struct Agent {
    retriever: Arc<EmbeddingRetriever>,
    toolbox: Arc<Toolbox>,
    backend: Arc<dyn ChatBackend>,
    settings: AgentSettings,
    tools: OnceCell<Vec<ToolDescriptor>>,
    state: Mutex<AgentState>,
    closed: watch::Sender<bool>,
}

impl Agent {
    pub fn new(
        retriever: Arc<EmbeddingRetriever>,
        toolbox: Arc<Toolbox>,
        backend: Arc<dyn ChatBackend>,
        settings: AgentSettings,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            retriever,
            toolbox,
            backend,
            settings,
            tools: OnceCell::new(),
            state: Mutex::new(AgentState::Idle),
            closed,
        }
    }

    /// Wire up the remote embedding service, the configured store, every
    /// configured tool server and the chat endpoint, then connect the tools.
    pub async fn connect(config: &RagentConfig) -> anyhow::Result<Self> {
        let retriever = Arc::new(EmbeddingRetriever::from_config(config)?);
        let toolbox = Arc::new(Toolbox::from_config(&config.tools)?);
        let backend: Arc<dyn ChatBackend> = Arc::new(OpenAiChatBackend::new(&config.model)?);

        let agent = Self::new(retriever, toolbox, backend, AgentSettings::from_config(config));
        if let Err(err) = agent.init().await {
            if let Err(close_err) = agent.close().await {
                tracing::warn!(error = %close_err, "failed to release agent after init failure");
            }
            return Err(err.into());
        }
        Ok(agent)
    }

    pub fn state(&self) -> AgentState {
        self.state.lock().map(|s| *s).unwrap_or(AgentState::Failed)
    }

    fn set_state(&self, next: AgentState) {
        if let Ok(mut state) = self.state.lock() {
            if *state != next {
                tracing::debug!(from = ?*state, to = ?next, "agent state");
                *state = next;
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub fn retriever(&self) -> &Arc<EmbeddingRetriever> {
        &self.retriever
    }

    /// Connect every tool server once. Later calls return the cached list.
    pub async fn init(&self) -> Result<&[ToolDescriptor]> {
        let tools = self
            .tools
            .get_or_try_init(|| async {
                self.guarded(self.toolbox.init()).await?;
                Ok::<_, RagentError>(self.toolbox.descriptors())
            })
            .await
            .map_err(|err| {
                self.set_state(AgentState::Failed);
                err.at(Stage::Init)
            })?;
        Ok(tools.as_slice())
    }

    /// Answer `task`: retrieve context, then converse until the model stops
    /// requesting tools.
    pub async fn run(&self, task: &str) -> Result<AgentOutcome> {
        if self.is_closed() {
            return Err(RagentError::NotReady {
                component: "agent",
                state: "closed",
            });
        }

        let result = self.drive(task).await;
        match &result {
            Ok(outcome) => {
                self.set_state(AgentState::Done);
                tracing::info!(
                    turns = outcome.turns,
                    tool_calls = outcome.tool_calls,
                    degraded = outcome.retrieval_degraded,
                    "task complete"
                );
            }
            Err(err) => {
                self.set_state(AgentState::Failed);
                tracing::error!(error = %err, "task failed");
            }
        }
        result
    }

    async fn drive(&self, task: &str) -> Result<AgentOutcome> {
        let tools = self.init().await?.to_vec();

        self.set_state(AgentState::Retrieving);
        let retrieval = self
            .guarded(self.retriever.retrieve(task, self.settings.top_k))
            .await
            .map_err(|err| err.at(Stage::Retrieving))?;
        if retrieval.status.is_degraded() {
            tracing::warn!("query embedding degraded, retrieved context is unreliable");
        }

        let mut conversation = ConversationalModel::new(
            self.settings.model.clone(),
            Arc::clone(&self.backend),
            self.settings.system_prompt.as_deref(),
            tools,
        )
        .with_context(&retrieval.context(&self.settings.separator));

        let mut prompt = Some(task);
        let mut tool_calls = 0;

        for turn in 1..=self.settings.max_turns {
            self.set_state(AgentState::Conversing);
            let response = self
                .chat_with_retry(&mut conversation, prompt.take())
                .await
                .map_err(|err| err.at(Stage::Conversing))?;

            if !response.has_tool_calls() {
                return Ok(AgentOutcome {
                    answer: response.content.unwrap_or_default(),
                    turns: turn,
                    tool_calls,
                    context_documents: retrieval.documents.len(),
                    relevance_score: retrieval.relevance_score(),
                    retrieval_degraded: retrieval.status.is_degraded(),
                    transcript: conversation.history().to_vec(),
                });
            }

            self.set_state(AgentState::AwaitingTools);
            tracing::debug!(turn, requested = response.tool_calls.len(), "dispatching tool calls");
            let outputs = self
                .guarded(async { Ok(self.dispatch(&response.tool_calls).await) })
                .await
                .map_err(|err| err.at(Stage::AwaitingTools))?;

            for (call, output) in response.tool_calls.iter().zip(outputs) {
                conversation
                    .append_tool_result(&call.id, output)
                    .map_err(|err| err.at(Stage::AwaitingTools))?;
            }
            tool_calls += response.tool_calls.len();
        }

        Err(RagentError::TurnLimitExceeded(self.settings.max_turns).at(Stage::Conversing))
    }

    async fn chat_with_retry(
        &self,
        conversation: &mut ConversationalModel,
        prompt: Option<&str>,
    ) -> Result<ChatResponse> {
        let mut attempt = 0;
        loop {
            let result = self
                .guarded(async {
                    let timeout = self.settings.model_timeout;
                    match tokio::time::timeout(timeout, conversation.chat(prompt)).await {
                        Ok(result) => result,
                        Err(_) => Err(RagentError::ModelCallFailed {
                            model: conversation.model_id().to_string(),
                            message_count: conversation.history().len() + usize::from(prompt.is_some()),
                            reason: format!("timed out after {timeout:?}"),
                        }),
                    }
                })
                .await;

            match result {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < self.settings.max_model_retries => {
                    let delay = self.settings.retry_backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying model call");
                    self.guarded(async {
                        tokio::time::sleep(delay).await;
                        Ok(())
                    })
                    .await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run one turn's tool calls concurrently. Outputs come back in request order.
    async fn dispatch(&self, calls: &[ToolCall]) -> Vec<String> {
        join_all(calls.iter().map(|call| self.execute(call))).await
    }

    async fn execute(&self, call: &ToolCall) -> String {
        let arguments = match parse_arguments(&call.arguments) {
            Ok(arguments) => arguments,
            Err(err) => return error_payload(&call.name, &err),
        };

        match self.call_with_retry(&call.name, arguments).await {
            Ok(output) => render_output(&call.name, output),
            Err(err) => {
                tracing::warn!(tool = %call.name, id = %call.id, error = %err, "tool call failed");
                error_payload(&call.name, &err)
            }
        }
    }

    async fn call_with_retry(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput> {
        let timeout = self.settings.tool_timeout;
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(timeout, self.toolbox.call(name, arguments.clone())).await {
                Ok(result) => result,
                Err(_) => Err(RagentError::ToolExecutionFailed {
                    tool: name.to_string(),
                    message: format!("timed out after {timeout:?}"),
                }),
            };

            match result {
                Err(err @ RagentError::ToolExecutionFailed { .. }) if attempt < self.settings.tool_retries => {
                    attempt += 1;
                    tracing::warn!(tool = %name, attempt, error = %err, "retrying tool call");
                }
                other => return other,
            }
        }
    }

    /// Race `fut` against [`Agent::close`].
    async fn guarded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(RagentError::Cancelled);
        }
        tokio::select! {
            result = fut => result,
            _ = closed.wait_for(|c| *c) => Err(RagentError::Cancelled),
        }
    }

    /// Cancel any in-flight run and release tool servers and the vector
    /// store. Only the first call does anything.
    pub async fn close(&self) -> Result<()> {
        if self.closed.send_replace(true) {
            return Ok(());
        }
        tracing::debug!("closing agent");

        let tools = self.toolbox.close().await;
        let store = self.retriever.close().await;
        tools.and(store)
    }
}

/// Model-supplied arguments as a JSON object. Empty or `null` means no arguments.
fn parse_arguments(raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(RagentError::InvalidInput(format!(
            "tool arguments must be a JSON object, got {other}"
        ))),
        Err(err) => Err(RagentError::InvalidInput(format!(
            "tool arguments are not valid JSON: {err}"
        ))),
    }
}

fn render_output(tool: &str, output: ToolOutput) -> String {
    if output.is_error {
        return json!({
            "error": {
                "kind": "tool_error",
                "tool": tool,
                "message": output.content,
            }
        })
        .to_string();
    }
    match output.content {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn error_payload(tool: &str, err: &RagentError) -> String {
    json!({
        "error": {
            "kind": err.kind(),
            "tool": tool,
            "message": err.to_string(),
        }
    })
    .to_string()
}
