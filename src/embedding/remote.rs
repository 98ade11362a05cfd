//! Remote HTTP embedding provider.
//!
//! Talks to either a llama.cpp-style `/embedding` endpoint (`{"content": ...}`)
//! or an OpenAI-compatible `/v1/embeddings` endpoint (`{"model", "input"}`).
//! Response bodies are matched against the known shapes in
//! [`EmbeddingResponse`]; anything else is reported as malformed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{RagentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFormat {
    Content,
    OpenAi,
}

impl std::str::FromStr for RequestFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "content" => Ok(Self::Content),
            "openai" => Ok(Self::OpenAi),
            _ => Err(format!("unknown embedding request format: {s}")),
        }
    }
}

pub struct RemoteEmbeddingProvider {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    format: RequestFormat,
    http: Client,
}

impl RemoteEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let format = config
            .request_format
            .parse::<RequestFormat>()
            .map_err(anyhow::Error::msg)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            format,
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = match self.format {
            RequestFormat::Content => serde_json::to_value(ContentRequest { content: text })?,
            RequestFormat::OpenAi => serde_json::to_value(OpenAiRequest {
                model: &self.model,
                input: text,
            })?,
        };

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagentError::Transport(format!(
                "embedding endpoint returned {status}: {}",
                body.trim()
            )));
        }

        let payload: EmbeddingResponse = response.json().await?;
        payload.into_vector()
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ContentRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// A vector field that may be flat (`[..]`) or wrapped once (`[[..]]`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum VectorValue {
    Flat(Vec<f32>),
    Nested(Vec<Vec<f32>>),
}

impl VectorValue {
    fn into_flat(self) -> Option<Vec<f32>> {
        match self {
            Self::Flat(v) => Some(v),
            Self::Nested(rows) => rows.into_iter().next(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingItem {
    embedding: VectorValue,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiItem {
    embedding: Vec<f32>,
}

/// Every response shape the provider understands, plus a catch-all.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingResponse {
    /// `{"data": [{"embedding": [..]}]}`
    OpenAi { data: Vec<OpenAiItem> },
    /// `{"embedding": [..]}` or `{"embedding": [[..]]}`
    Object { embedding: VectorValue },
    /// `[{"embedding": [[..]]}]`
    Batch(Vec<EmbeddingItem>),
    /// `[..]` or `[[..]]`
    Bare(VectorValue),
    Unrecognized(Value),
}

impl EmbeddingResponse {
    /// Extract the first non-empty vector, or fail with `MalformedResponse`.
    pub fn into_vector(self) -> Result<Vec<f32>> {
        let vector = match self {
            Self::OpenAi { data } => data.into_iter().next().map(|item| item.embedding),
            Self::Object { embedding } => embedding.into_flat(),
            Self::Batch(items) => items.into_iter().next().and_then(|i| i.embedding.into_flat()),
            Self::Bare(value) => value.into_flat(),
            Self::Unrecognized(value) => {
                let preview: String = value.to_string().chars().take(120).collect();
                return Err(RagentError::MalformedResponse(format!(
                    "unrecognized embedding response: {preview}"
                )));
            }
        };

        match vector {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(RagentError::MalformedResponse(
                "embedding response contained no vector".into(),
            )),
        }
    }
}
