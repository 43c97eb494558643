//! Backend for OpenAI-compatible chat completions APIs.
//!
//! Non-streaming by contract: one request collapses to one completed
//! assistant turn. Tool call arguments pass through as the raw strings the
//! API produced.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use celeste_core::error::{CelesteError, Result};
use celeste_core::provider::{serializable_tools, BackendRequest, BackendResponse, ChatBackend};
use celeste_core::types::{ChatMessage, ToolCallRef, Usage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Generic backend for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatibleBackend {
    name: String,
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleBackend {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            name: "openai-compatible".to_string(),
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: reqwest::Client::new(),
        }
    }

    /// Override the backend name (used by provider-branded wrappers).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request_body(&self, request: &BackendRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> =
            request.messages.iter().map(message_to_wire).collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });

        let tools = serializable_tools(&request.tools);
        if !tools.is_empty() {
            let tool_defs: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body.as_object_mut()
                .expect("body is an object")
                .insert("tools".into(), tool_defs.into());
        }

        body
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_sync(&self, request: &BackendRequest) -> Result<BackendResponse> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, backend = %self.name, "chat completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(CelesteError::api(status, body_text.trim().to_string()));
        }

        let data: ChatCompletionResponse = resp.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CelesteError::api(200, "no choices in completion response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRef {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(BackendResponse {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: data.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}

fn message_to_wire(msg: &ChatMessage) -> serde_json::Value {
    match msg {
        ChatMessage::System { content, .. } => {
            serde_json::json!({ "role": "system", "content": content })
        }
        ChatMessage::User { content, .. } => {
            serde_json::json!({ "role": "user", "content": content })
        }
        ChatMessage::Assistant {
            content,
            tool_calls,
            ..
        } => {
            if tool_calls.is_empty() {
                serde_json::json!({
                    "role": "assistant",
                    "content": content.clone().unwrap_or_default(),
                })
            } else {
                let calls: Vec<serde_json::Value> = tool_calls
                    .iter()
                    .map(|tc| {
                        serde_json::json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments,
                            }
                        })
                    })
                    .collect();
                serde_json::json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": calls,
                })
            }
        }
        ChatMessage::Tool {
            content,
            tool_call_id,
            name,
            ..
        } => serde_json::json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "name": name,
            "content": content,
        }),
    }
}

// Wire response types (internal).

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
