//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::workspace::normalize_workspace;
use crate::error::Result;

pub const DEFAULT_COMPLETION_MARKER: &str = "TASK_COMPLETE:";

/// Options controlling one agent run. Serialized into every checkpoint so a
/// resumed run keeps the limits it started with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunOptions {
    /// Workspace root for the development tools. Empty means "current
    /// directory", resolved by [`RunOptions::normalized`].
    pub workspace: PathBuf,
    pub max_turns: u32,
    pub max_tool_calls_per_turn: usize,
    pub max_consecutive_no_tool_turns: u32,
    pub request_timeout: Duration,
    pub tool_timeout: Duration,
    pub require_completion_marker: bool,
    pub completion_marker: String,
    pub disable_checkpoints: bool,
    pub verbose: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workspace: PathBuf::new(),
            max_turns: 12,
            max_tool_calls_per_turn: 8,
            max_consecutive_no_tool_turns: 3,
            request_timeout: Duration::from_secs(90),
            tool_timeout: Duration::from_secs(45),
            require_completion_marker: true,
            completion_marker: DEFAULT_COMPLETION_MARKER.to_string(),
            disable_checkpoints: false,
            verbose: true,
        }
    }
}

impl RunOptions {
    /// Resolve the workspace and clamp degenerate values back to defaults.
    pub fn normalized(mut self) -> Result<Self> {
        let defaults = Self::default();
        self.workspace = normalize_workspace(Some(self.workspace.as_path()))?;
        if self.max_turns == 0 {
            self.max_turns = defaults.max_turns;
        }
        if self.max_tool_calls_per_turn == 0 {
            self.max_tool_calls_per_turn = defaults.max_tool_calls_per_turn;
        }
        if self.max_consecutive_no_tool_turns == 0 {
            self.max_consecutive_no_tool_turns = defaults.max_consecutive_no_tool_turns;
        }
        if self.request_timeout.is_zero() {
            self.request_timeout = defaults.request_timeout;
        }
        if self.tool_timeout.is_zero() {
            self.tool_timeout = defaults.tool_timeout;
        }
        if self.completion_marker.trim().is_empty() {
            self.completion_marker = defaults.completion_marker;
        }
        Ok(self)
    }
}
