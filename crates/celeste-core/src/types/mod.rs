//! Core data types shared across the runtime.

mod message;
mod usage;

pub use message::{ChatMessage, ToolCallRef};
pub use usage::Usage;
