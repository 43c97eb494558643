//! Interactive chat surface over the tool dispatch protocol.
//!
//! [`ChatSession`] drives one user input through the same
//! assistant-then-tools sequencing the agent loop uses. A bounded session
//! caps tool iterations per input; hitting the cap appends a system message
//! recording the stop and blocks further dispatch until the next input.

use std::sync::Arc;

use crate::dispatch::{dedupe_tool_calls, error_payload, format_tool_result};
use crate::error::Result;
use crate::provider::{BackendRequest, ChatBackend};
use crate::tools::{ToolArguments, ToolRegistry};
use crate::types::{ChatMessage, ToolCallRef};

const SAFETY_STOP_NOTICE: &str =
    "Tool iteration limit reached; stopped repeated tool calls. Waiting for user input before executing more tools.";

/// A multi-turn conversation with tool dispatch.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    registry: ToolRegistry,
    messages: Vec<ChatMessage>,
    /// Tool iteration cap per user input; 0 means unbounded.
    max_tool_iterations: usize,
    tool_iterations: usize,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, registry: ToolRegistry) -> Self {
        Self {
            backend,
            registry,
            messages: Vec::new(),
            max_tool_iterations: 0,
            tool_iterations: 0,
        }
    }

    /// Bound the number of tool batches executed per user input.
    pub fn with_tool_iteration_cap(mut self, cap: usize) -> Self {
        self.max_tool_iterations = cap;
        self
    }

    /// Prepend a system prompt if the conversation has not started.
    pub fn set_system_prompt(&mut self, text: impl Into<String>) {
        if self.messages.is_empty() {
            self.messages.push(ChatMessage::system(text));
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Send one user input and drive tool dispatch until the assistant
    /// answers without tool calls (or the iteration cap stops it). Returns
    /// the final assistant text.
    pub async fn send(&mut self, text: impl Into<String>) -> Result<String> {
        self.tool_iterations = 0;
        self.messages.push(ChatMessage::user(text));

        loop {
            let request = BackendRequest {
                messages: self.messages.clone(),
                tools: self.registry.definitions(),
            };
            let response = self.backend.send_sync(&request).await?;
            let tool_calls = dedupe_tool_calls(response.tool_calls);
            self.messages.push(ChatMessage::assistant_with_calls(
                response.text.clone(),
                tool_calls.clone(),
            ));

            if tool_calls.is_empty() {
                return Ok(response.text);
            }

            if self.max_tool_iterations > 0 && self.tool_iterations >= self.max_tool_iterations {
                self.messages.push(ChatMessage::system(SAFETY_STOP_NOTICE));
                return Ok(response.text);
            }
            self.tool_iterations += 1;

            // All tool results are appended before the next request.
            for call in &tool_calls {
                let message = self.dispatch(call).await;
                self.messages.push(message);
            }
        }
    }

    async fn dispatch(&self, call: &ToolCallRef) -> ChatMessage {
        let content = match serde_json::from_str::<serde_json::Value>(&call.arguments) {
            Err(_) => error_payload(&call.name, "invalid tool arguments JSON"),
            Ok(value) => {
                let args = ToolArguments::new(value);
                match self.registry.execute(&call.name, &args).await {
                    Ok(value) => format_tool_result(value),
                    Err(err) => error_payload(&call.name, &err.to_string()),
                }
            }
        };
        ChatMessage::tool(call.id.clone(), call.name.clone(), content)
    }
}
