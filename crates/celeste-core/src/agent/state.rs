//! Persistent run state: the single entity the checkpoint store snapshots.

use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::options::RunOptions;
use crate::types::ChatMessage;

const STEP_SNAPSHOT_CHARS: usize = 200;

/// Terminal and non-terminal run statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    MaxTurnsReached,
    NoProgressStopped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::MaxTurnsReached => "max_turns_reached",
            Self::NoProgressStopped => "no_progress_stopped",
        };
        f.write_str(s)
    }
}

/// Kinds of audit-trail entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Goal,
    Assistant,
    Tool,
}

/// One audit-trail entry with a truncated content snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub turn: u32,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Step {
    pub fn goal(goal: &str) -> Self {
        Self {
            turn: 0,
            kind: StepKind::Goal,
            name: None,
            content: truncate_for_step(goal),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(turn: u32, content: &str) -> Self {
        Self {
            turn,
            kind: StepKind::Assistant,
            name: None,
            content: truncate_for_step(content),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tool(turn: u32, name: &str, content: &str, tool_call_id: &str) -> Self {
        Self {
            turn,
            kind: StepKind::Tool,
            name: Some(name.to_string()),
            content: truncate_for_step(content),
            tool_call_id: Some(tool_call_id.to_string()),
            timestamp: Utc::now(),
        }
    }
}

/// The full state of one agent run. Mutated only by the runner; persisted
/// after every turn unless checkpoints are disabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    pub run_id: String,
    pub goal: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub turn: u32,
    pub consecutive_no_tool_turns: u32,
    pub tool_call_count: u32,
    pub messages: Vec<ChatMessage>,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_assistant_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub options: RunOptions,
}

impl RunState {
    pub fn new(goal: impl Into<String>, options: RunOptions) -> Self {
        let now = Utc::now();
        Self {
            run_id: generate_run_id(Local::now()),
            goal: goal.into(),
            status: RunStatus::Running,
            created_at: now,
            updated_at: now,
            completed_at: None,
            turn: 0,
            consecutive_no_tool_turns: 0,
            tool_call_count: 0,
            messages: Vec::new(),
            steps: Vec::new(),
            last_assistant_response: String::new(),
            error: None,
            options,
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            goal: self.goal.clone(),
            status: self.status,
            updated_at: self.updated_at,
            turn: self.turn,
            tool_calls: self.tool_call_count,
        }
    }
}

/// Compact listing entry for `--list-runs`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub goal: String,
    pub status: RunStatus,
    pub updated_at: DateTime<Utc>,
    pub turn: u32,
    pub tool_calls: u32,
}

/// Sortable wall-clock run id: `YYYYMMDD-HHMMSS.nnnnnnnnn` in local time.
/// Nanosecond precision keeps successive runs distinct.
fn generate_run_id(t: DateTime<Local>) -> String {
    t.format("%Y%m%d-%H%M%S.%f").to_string()
}

/// Snapshot content for the audit trail, truncated on a char boundary.
pub(crate) fn truncate_for_step(s: &str) -> String {
    let s = s.trim();
    match s.char_indices().nth(STEP_SNAPSHOT_CHARS) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
