//! CLI argument definitions for Celeste.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Celeste terminal assistant
#[derive(Parser, Debug)]
#[command(name = "celeste", version, about = "Celeste — terminal AI assistant")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the autonomous agent loop
    Agent(AgentArgs),
}

/// Arguments for the `agent` subcommand.
#[derive(Parser, Debug)]
pub struct AgentArgs {
    /// Task goal text
    #[arg(long)]
    pub goal: Option<String>,

    /// Path to a file containing task goal text (concatenated with --goal)
    #[arg(long, value_name = "PATH")]
    pub goal_file: Option<PathBuf>,

    /// Resume an existing run by run id
    #[arg(long, value_name = "RUN_ID")]
    pub resume: Option<String>,

    /// List recent agent runs
    #[arg(long)]
    pub list_runs: bool,

    /// Run evaluation cases from a JSON file
    #[arg(long, value_name = "PATH")]
    pub eval: Option<PathBuf>,

    /// Workspace root for agent development tools (defaults to current directory)
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Maximum agent turns
    #[arg(long, value_name = "N")]
    pub max_turns: Option<u32>,

    /// Maximum tool calls per turn
    #[arg(long, value_name = "N")]
    pub max_tool_calls: Option<usize>,

    /// Maximum consecutive no-tool turns before stopping
    #[arg(long, value_name = "N")]
    pub max_no_tool_turns: Option<u32>,

    /// LLM request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub request_timeout: Option<u64>,

    /// Tool execution timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub tool_timeout: Option<u64>,

    /// Completion marker token
    #[arg(long, default_value = "TASK_COMPLETE:")]
    pub completion_marker: String,

    /// Require completion marker in final response
    #[arg(
        long = "require-complete-marker",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
    )]
    pub require_complete_marker: bool,

    /// Disable checkpoint persistence for this run
    #[arg(long = "no-checkpoint")]
    pub no_checkpoint: bool,

    /// Print turn-by-turn output
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
    )]
    pub verbose: bool,

    /// Remaining words are joined as the goal when --goal is absent
    #[arg(trailing_var_arg = true)]
    pub rest: Vec<String>,
}
