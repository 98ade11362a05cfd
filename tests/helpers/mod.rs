#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use ragent::agent::{Agent, AgentSettings};
use ragent::embedding::{EmbeddingProvider, EmbeddingRetriever};
use ragent::error::{RagentError, Result};
use ragent::model::{ChatBackend, ChatRequest, ChatResponse, Message, ToolCall};
use ragent::store::InMemoryVectorStore;
use ragent::tools::{ToolClient, ToolDescriptor, ToolOutput, ToolTransport, Toolbox};

pub const DIMS: usize = 8;

/// Embeds text as keyword counts, one slot per keyword, padded to `DIMS`.
/// Texts with no keywords embed to the zero vector.
pub struct KeywordEmbedder {
    keywords: Vec<&'static str>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&'static str]) -> Self {
        assert!(keywords.len() <= DIMS);
        Self {
            keywords: keywords.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Vocabulary for the Bell's palsy scenario.
    pub fn medical() -> Self {
        Self::new(&["treatment", "steroids", "eye", "weakness", "facial", "causes"])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        let mut vector = vec![0.0f32; DIMS];
        for (slot, keyword) in self.keywords.iter().enumerate() {
            vector[slot] = lower.matches(keyword).count() as f32;
        }
        Ok(vector)
    }

    fn model(&self) -> &str {
        "keyword-stub"
    }
}

/// Always fails like an unreachable service.
#[derive(Default)]
pub struct FailingEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RagentError::Transport("connection refused".into()))
    }

    fn model(&self) -> &str {
        "failing-stub"
    }
}

/// Retriever over an in-memory store pre-loaded with `documents`.
pub async fn retriever_with(provider: Arc<dyn EmbeddingProvider>, documents: &[&str]) -> Arc<EmbeddingRetriever> {
    let retriever = EmbeddingRetriever::new(provider, Arc::new(InMemoryVectorStore::new()), DIMS)
        .with_call_policy(Duration::from_millis(500), 0);
    for doc in documents {
        retriever.embed_document(doc).await.unwrap();
    }
    Arc::new(retriever)
}

/// Chat backend that replays a script of responses and records every request.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<ChatResponse>>>,
    /// Returned once the script runs out; `None` makes an exhausted script an error.
    fallback: Option<ChatResponse>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<ChatResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers every request with `response`.
    pub fn repeating(response: ChatResponse) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: ChatRequest<'_>) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request.messages.to_vec());
        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(step), _) => step,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(RagentError::MalformedResponse("script exhausted".into())),
        }
    }
}

type Handler = Box<dyn Fn(&str, &Map<String, Value>) -> Result<ToolOutput> + Send + Sync>;

/// In-process tool server. Records calls and lifecycle events.
pub struct FakeTransport {
    tools: Vec<ToolDescriptor>,
    handler: Handler,
    delays: HashMap<String, Duration>,
    connect_delay: Option<Duration>,
    fail_connect: bool,
    pub calls: Mutex<Vec<(String, Map<String, Value>)>>,
    pub completed: Mutex<Vec<String>>,
    pub connects: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl FakeTransport {
    pub fn new(
        tools: &[&str],
        handler: impl Fn(&str, &Map<String, Value>) -> Result<ToolOutput> + Send + Sync + 'static,
    ) -> Self {
        Self {
            tools: tools.iter().map(|name| descriptor(name)).collect(),
            handler: Box::new(handler),
            delays: HashMap::new(),
            connect_delay: None,
            fail_connect: false,
            calls: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        }
    }

    /// Every tool echoes its arguments back.
    pub fn echo(tools: &[&str]) -> Self {
        Self::new(tools, |_, args| Ok(ToolOutput::success(Value::Object(args.clone()))))
    }

    pub fn with_delay(mut self, tool: &str, delay: Duration) -> Self {
        self.delays.insert(tool.to_string(), delay);
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn call_count(&self, tool: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(name, _)| name == tool).count()
    }
}

#[async_trait]
impl ToolTransport for FakeTransport {
    async fn connect(&self) -> Result<Vec<ToolDescriptor>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect {
            return Err(RagentError::Transport("tool server unreachable".into()));
        }
        Ok(self.tools.clone())
    }

    async fn call(&self, name: &str, arguments: Map<String, Value>) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push((name.to_string(), arguments.clone()));
        if let Some(delay) = self.delays.get(name) {
            tokio::time::sleep(*delay).await;
        }
        let result = (self.handler)(name, &arguments);
        self.completed.lock().unwrap().push(name.to_string());
        result
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn descriptor(name: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: format!("{name} tool"),
        input_schema: serde_json::json!({ "type": "object", "properties": {} }),
    }
}

pub fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

/// Agent limits shrunk so failure paths finish quickly.
pub fn fast_settings() -> AgentSettings {
    AgentSettings {
        model: "scripted".into(),
        system_prompt: Some("You are a test assistant.".into()),
        top_k: 1,
        separator: "\n---\n".into(),
        max_turns: 25,
        max_model_retries: 2,
        retry_backoff: Duration::from_millis(1),
        model_timeout: Duration::from_secs(5),
        tool_timeout: Duration::from_millis(500),
        tool_retries: 1,
    }
}

pub struct Harness {
    pub agent: Arc<Agent>,
    pub backend: Arc<ScriptedBackend>,
    pub transport: Arc<FakeTransport>,
}

/// Agent over a keyword retriever, one fake tool server and a scripted model.
pub async fn harness(
    backend: Arc<ScriptedBackend>,
    transport: FakeTransport,
    settings: AgentSettings,
) -> Harness {
    let retriever = retriever_with(
        Arc::new(KeywordEmbedder::medical()),
        &[
            "Bell's palsy causes facial weakness.",
            "Treatment includes eye protection and steroids.",
        ],
    )
    .await;
    let transport = Arc::new(transport);
    let client = Arc::new(ToolClient::new("fake", transport.clone()));
    let toolbox = Arc::new(Toolbox::new(vec![client]));
    let agent = Agent::new(retriever, toolbox, backend.clone(), settings);
    Harness {
        agent: Arc::new(agent),
        backend,
        transport,
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
