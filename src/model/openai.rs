//! OpenAI-compatible chat-completion backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::{ChatBackend, ChatRequest, ChatResponse, Message, ToolCall};
use crate::config::ModelConfig;
use crate::error::{RagentError, Result};

pub struct OpenAiChatBackend {
    endpoint: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    http: Client,
}

impl OpenAiChatBackend {
    pub fn new(config: &ModelConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatBackend {
    async fn complete(&self, request: ChatRequest<'_>) -> Result<ChatResponse> {
        let body = WireRequest {
            model: request.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: request
                .tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunctionDef {
                        name: &tool.name,
                        description: &tool.description,
                        parameters: &tool.input_schema,
                    },
                })
                .collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut http_request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(RagentError::Transport(format!(
                "chat endpoint returned {status}: {}",
                text.trim()
            )));
        }

        let payload: Value = response.json().await?;
        CompletionShape::classify(&payload).into_response()
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.content.as_deref(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: &call.id,
                    kind: "function",
                    function: WireFunctionCall {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

/// The response shapes a chat endpoint may answer with.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionShape {
    /// `message.tool_calls` with one or more entries.
    ToolCalls {
        content: Option<String>,
        calls: Vec<ToolCall>,
    },
    /// Legacy single `message.function_call`, which carries no id.
    FunctionCall(ToolCall),
    /// Plain assistant text.
    Text(String),
    Unrecognized(String),
}

impl CompletionShape {
    pub fn classify(body: &Value) -> Self {
        let Some(message) = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
        else {
            return Self::Unrecognized(preview(body));
        };

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(calls) = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .filter(|calls| !calls.is_empty())
        {
            let parsed: Option<Vec<ToolCall>> = calls
                .iter()
                .map(|call| {
                    let id = call.get("id").and_then(Value::as_str).map(str::to_string);
                    parse_function(call.get("function")?, id)
                })
                .collect();
            return match parsed {
                Some(calls) => Self::ToolCalls { content, calls },
                None => Self::Unrecognized(preview(message)),
            };
        }

        if let Some(function) = message.get("function_call").filter(|f| !f.is_null()) {
            return match parse_function(function, None) {
                Some(call) => Self::FunctionCall(call),
                None => Self::Unrecognized(preview(message)),
            };
        }

        match message.get("content") {
            Some(Value::String(text)) => Self::Text(text.clone()),
            Some(Value::Null) | None => Self::Text(String::new()),
            Some(_) => Self::Unrecognized(preview(message)),
        }
    }

    pub fn into_response(self) -> Result<ChatResponse> {
        match self {
            Self::ToolCalls { content, calls } => Ok(ChatResponse {
                content,
                tool_calls: calls,
            }),
            Self::FunctionCall(call) => Ok(ChatResponse::tools(vec![call])),
            Self::Text(text) => Ok(ChatResponse::text(text)),
            Self::Unrecognized(body) => Err(RagentError::MalformedResponse(format!(
                "unrecognized chat completion: {body}"
            ))),
        }
    }
}

fn parse_function(function: &Value, id: Option<String>) -> Option<ToolCall> {
    let name = function.get("name")?.as_str()?.to_string();
    let arguments = match function.get("arguments") {
        Some(Value::String(raw)) => raw.clone(),
        Some(Value::Null) | None => "{}".to_string(),
        Some(other) => other.to_string(),
    };
    Some(ToolCall {
        id: id.unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
        name,
        arguments,
    })
}

fn preview(value: &Value) -> String {
    value.to_string().chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_plain_text() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "Hi"}}]});
        assert_eq!(CompletionShape::classify(&body), CompletionShape::Text("Hi".into()));
    }

    #[test]
    fn classifies_tool_calls_in_order() {
        let body = json!({"choices": [{"message": {
            "role": "assistant",
            "content": null,
            "tool_calls": [
                {"id": "a", "type": "function", "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}},
                {"id": "b", "type": "function", "function": {"name": "get_time", "arguments": {"tz": "CET"}}}
            ]
        }}]});
        let response = CompletionShape::classify(&body).into_response().unwrap();
        assert_eq!(response.content, None);
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(response.tool_calls[0].id, "a");
        assert_eq!(response.tool_calls[0].arguments, "{\"city\":\"Paris\"}");
        assert_eq!(response.tool_calls[1].name, "get_time");
        assert_eq!(response.tool_calls[1].arguments, "{\"tz\":\"CET\"}");
    }

    #[test]
    fn legacy_function_call_gets_an_id() {
        let body = json!({"choices": [{"message": {
            "role": "assistant",
            "function_call": {"name": "get_current_weather", "arguments": "{\"city\":\"Oslo\"}"}
        }}]});
        match CompletionShape::classify(&body) {
            CompletionShape::FunctionCall(call) => {
                assert_eq!(call.name, "get_current_weather");
                assert!(call.id.starts_with("call_"));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn missing_choices_is_unrecognized() {
        let body = json!({"error": "overloaded"});
        assert!(matches!(
            CompletionShape::classify(&body).into_response(),
            Err(RagentError::MalformedResponse(_))
        ));
        let empty = json!({"choices": []});
        assert!(matches!(
            CompletionShape::classify(&empty),
            CompletionShape::Unrecognized(_)
        ));
    }

    #[test]
    fn tool_call_without_name_is_unrecognized() {
        let body = json!({"choices": [{"message": {"tool_calls": [{"id": "x", "function": {}}]}}]});
        assert!(matches!(
            CompletionShape::classify(&body),
            CompletionShape::Unrecognized(_)
        ));
    }

    #[test]
    fn wire_message_carries_tool_calls() {
        let message = Message::assistant(
            None,
            vec![ToolCall {
                id: "c1".into(),
                name: "lookup".into(),
                arguments: "{}".into(),
            }],
        );
        let wire = serde_json::to_value(WireMessage::from(&message)).unwrap();
        assert_eq!(wire["role"], "assistant");
        assert!(wire["content"].is_null());
        assert_eq!(wire["tool_calls"][0]["type"], "function");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "lookup");
    }
}
