//! Language model abstraction and the Ollama chat binding.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ModelConfig;
use crate::error::{Result, ScoutError};
use crate::message::{Message, Role, ToolArguments, ToolCall};
use crate::schema::ToolSchema;

/// Everything the backend needs for one completion.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolSchema],
}

/// The assistant turn returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelCompletion {
    pub fn into_message(self) -> Message {
        Message::assistant_with_tool_calls(self.content, self.tool_calls)
    }
}

/// A chat backend. One request, one complete (non-streamed) response.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete_chat(&self, request: ChatRequest<'_>) -> Result<ModelCompletion>;
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> ScoutError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return ScoutError::Transport(format!("{provider} rate limit exceeded: {body}"));
    }
    ScoutError::Transport(format!("{provider} request failed with {status}: {body}"))
}

/// Client for a local or remote Ollama server.
#[derive(Clone, Debug)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(300))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|err| ScoutError::Config(format!("invalid Ollama URL `{base_url}`: {err}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ScoutError::Transport(format!("http client error: {err}")))?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        Self::with_timeout(
            &cfg.ollama_url,
            Duration::from_secs(cfg.request_timeout_secs.max(1)),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Confirms the server is reachable and returns its reported version.
    pub async fn check_connection(&self) -> Result<String> {
        let resp = self
            .http
            .get(format!("{}/api/version", self.base_url))
            .send()
            .await
            .map_err(|e| ScoutError::Transport(format!("Ollama is unreachable: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "Ollama"));
        }

        let version: OllamaVersion = resp
            .json()
            .await
            .map_err(|e| ScoutError::Transport(format!("Ollama parse error: {e}")))?;
        Ok(version.version)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete_chat(&self, request: ChatRequest<'_>) -> Result<ModelCompletion> {
        let body = build_ollama_request(request);

        let resp = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ScoutError::Transport(format!("Ollama request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "Ollama"));
        }

        let parsed: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| ScoutError::Transport(format!("Ollama parse error: {e}")))?;

        parse_ollama_response(parsed)
    }
}

fn build_ollama_request<'a>(request: ChatRequest<'a>) -> OllamaChatRequest<'a> {
    let messages = request
        .messages
        .iter()
        .map(|message| OllamaMessage {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| OllamaToolCall {
                    function: OllamaFunctionCall {
                        name: call.name.clone(),
                        arguments: Value::Object(call.arguments.clone()),
                    },
                })
                .collect(),
        })
        .collect();

    OllamaChatRequest {
        model: request.model,
        messages,
        stream: false,
        tools: request.tools,
    }
}

fn parse_ollama_response(response: OllamaChatResponse) -> Result<ModelCompletion> {
    let message = response.message;
    if message.role != Role::Assistant.as_str() {
        return Err(ScoutError::Transport(format!(
            "Ollama returned a `{}` message where an assistant message was expected",
            message.role
        )));
    }

    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            let arguments = decode_arguments(&call.function.name, call.function.arguments)?;
            Ok(ToolCall::new(call.function.name, arguments))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ModelCompletion {
        content: message.content,
        tool_calls,
    })
}

/// Models usually send an object; some send it JSON-encoded as a string.
fn decode_arguments(tool: &str, raw: Value) -> Result<ToolArguments> {
    match raw {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(ToolArguments::new()),
        Value::String(text) if text.trim().is_empty() => Ok(ToolArguments::new()),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(ScoutError::Transport(format!(
                "arguments for tool call `{tool}` are not a JSON object: {text}"
            ))),
        },
        other => Err(ScoutError::Transport(format!(
            "arguments for tool call `{tool}` are not a JSON object: {other}"
        ))),
    }
}

/// A deterministic model used for tests and demos.
///
/// Each scripted response is either a JSON directive or plain text, which is returned
/// as the final answer. Every request's messages are recorded.
pub struct StubModel {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// The message history sent with each request so far.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum StubDirective {
    Respond {
        content: String,
    },
    CallTool {
        name: String,
        #[serde(default)]
        arguments: ToolArguments,
    },
    CallTools {
        calls: Vec<ToolCall>,
    },
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete_chat(&self, request: ChatRequest<'_>) -> Result<ModelCompletion> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.messages.to_vec());
        }

        let raw = self
            .responses
            .lock()
            .map_err(|_| ScoutError::Transport("stub model poisoned".into()))?
            .pop_front()
            .ok_or_else(|| ScoutError::Transport("StubModel ran out of scripted responses".into()))?;

        Ok(match serde_json::from_str::<StubDirective>(&raw) {
            Ok(StubDirective::Respond { content }) => ModelCompletion {
                content,
                tool_calls: Vec::new(),
            },
            Ok(StubDirective::CallTool { name, arguments }) => ModelCompletion {
                content: String::new(),
                tool_calls: vec![ToolCall::new(name, arguments)],
            },
            Ok(StubDirective::CallTools { calls }) => ModelCompletion {
                content: String::new(),
                tool_calls: calls,
            },
            Err(_) => ModelCompletion {
                content: raw,
                tool_calls: Vec::new(),
            },
        })
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolSchema],
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaVersion {
    version: String,
}
