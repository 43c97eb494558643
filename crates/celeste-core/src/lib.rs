//! Celeste core: an autonomous agent runtime over a unified chat and
//! tool-calling contract.
//!
//! The pieces fit together like this: an [`agent::AgentRunner`] drives a
//! goal through turns against a [`provider::ChatBackend`], dispatching tool
//! calls through a [`tools::ToolRegistry`] (including the sandboxed
//! `dev_*` workspace tools) and persisting [`agent::RunState`] snapshots via
//! [`agent::CheckpointStore`]. The [`chat::ChatSession`] reuses the same
//! dispatch protocol for interactive use, and [`agent::eval`] scores scripted
//! goals against the loop.

pub mod agent;
pub mod chat;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod provider;
pub mod tools;
pub mod types;

pub use agent::{AgentRunner, CheckpointStore, RunOptions, RunState, RunStatus};
pub use chat::ChatSession;
pub use error::{CelesteError, Result};
pub use provider::{BackendRequest, BackendResponse, ChatBackend, ToolDefinition};
pub use types::{ChatMessage, ToolCallRef, Usage};
