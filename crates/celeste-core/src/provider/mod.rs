//! Provider adapter seam.
//!
//! The runtime depends on a single capability: send one chat+tools request
//! and get back the completed assistant turn. Everything provider-specific
//! (wire shapes, auth, streaming collapse) lives behind [`ChatBackend`];
//! the loop never sees partial tokens.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChatMessage, ToolCallRef, Usage};

/// A tool exposed to the model: name, description, and JSON Schema parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One chat request: the full message history plus the current tool set.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// The completed assistant turn for one request.
#[derive(Debug, Clone, Default)]
pub struct BackendResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRef>,
    pub usage: Option<Usage>,
}

/// Single-method capability the runner depends on.
///
/// Implementations must preserve `tool_call_id` values round-trip and surface
/// transport/HTTP/decode failures as errors rather than empty turns.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for diagnostics (e.g. "openai-compatible", "xai").
    fn name(&self) -> &str;

    /// Issue one request and collect the final assistant turn.
    async fn send_sync(&self, request: &BackendRequest) -> Result<BackendResponse>;
}

/// Filter a tool set down to definitions a provider can serialize.
///
/// Definitions whose parameter schema is not object-typed are skipped with a
/// warning instead of failing the request.
pub fn serializable_tools(tools: &[ToolDefinition]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .filter(|tool| {
            if tool.parameters.is_object() {
                true
            } else {
                tracing::warn!(tool = %tool.name, "skipping tool with non-object parameter schema");
                false
            }
        })
        .cloned()
        .collect()
}
