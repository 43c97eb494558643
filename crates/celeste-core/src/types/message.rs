//! Conversation message types.
//!
//! [`ChatMessage`] is a tagged union over the four conversation roles. The
//! pairing invariant between an assistant's tool calls and the tool messages
//! that answer them lives in the variant shapes: only `Assistant` carries
//! [`ToolCallRef`]s and only `Tool` carries a `tool_call_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single message in a conversation, discriminated by role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    /// Persona/context text, set at run start only.
    System {
        content: String,
        timestamp: DateTime<Utc>,
    },
    User {
        content: String,
        timestamp: DateTime<Utc>,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRef>,
        timestamp: DateTime<Utc>,
    },
    /// Result of a tool invocation, paired to an assistant tool call by id.
    Tool {
        content: String,
        tool_call_id: String,
        name: String,
        timestamp: DateTime<Utc>,
    },
}

/// A tool invocation requested by the model.
///
/// `arguments` is the raw JSON string exactly as the provider produced it; it
/// is parsed only at dispatch time so the assistant message round-trips
/// byte-for-byte through providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRef {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            content: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a text-only assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(text.into()),
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant message carrying tool calls. An empty text becomes
    /// `None` so providers that reject empty content see a null there.
    pub fn assistant_with_calls(text: impl Into<String>, tool_calls: Vec<ToolCallRef>) -> Self {
        let text = text.into();
        Self::Assistant {
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls,
            timestamp: Utc::now(),
        }
    }

    /// Create a tool result message.
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            timestamp: Utc::now(),
        }
    }

    /// Text content of the message, empty for assistant turns without text.
    pub fn text(&self) -> &str {
        match self {
            Self::System { content, .. } | Self::User { content, .. } => content,
            Self::Assistant { content, .. } => content.as_deref().unwrap_or(""),
            Self::Tool { content, .. } => content,
        }
    }

    /// Tool calls carried by this message (empty for non-assistant roles).
    pub fn tool_calls(&self) -> &[ToolCallRef] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// The wire role name.
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }
}
