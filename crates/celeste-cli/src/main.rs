//! Celeste CLI binary entry point.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use celeste_core::agent::{load_eval_cases, AgentRunner, RunEvent};
use celeste_core::config::Config;
use celeste_core::{CheckpointStore, RunOptions, RunState, RunStatus};
use celeste_providers::backend_from_config;

use cli::{AgentArgs, Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Agent(args) => run_agent_command(args).await,
    };
    std::process::exit(exit_code);
}

async fn run_agent_command(args: AgentArgs) -> i32 {
    if args.list_runs {
        return list_runs();
    }

    let options = options_from_args(&args);

    let store = match CheckpointStore::new(None) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Error opening run store: {err}");
            return 1;
        }
    };

    let config = Config::from_env();
    let backend = match backend_from_config(&config) {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("Error: {err}");
            return 1;
        }
    };

    let runner = match AgentRunner::new(backend, options, store) {
        Ok(runner) => runner,
        Err(err) => {
            eprintln!("Error creating agent runner: {err}");
            return 1;
        }
    };
    let runner = if args.verbose {
        runner.with_event_sink(Arc::new(print_run_event))
    } else {
        runner
    };

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    if let Some(eval_file) = &args.eval {
        let cases = match load_eval_cases(eval_file) {
            Ok(cases) => cases,
            Err(err) => {
                eprintln!("Error loading eval cases: {err}");
                return 1;
            }
        };
        let results = runner.run_eval(&cancel, &cases).await;
        let mut passed = 0;
        for result in &results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            if result.passed {
                passed += 1;
            }
            println!(
                "[{status}] {} ({}) - {}",
                result.case_name, result.status, result.reason
            );
        }
        println!("\nEval Summary: {passed}/{} passed", results.len());
        return if passed == results.len() { 0 } else { 1 };
    }

    if let Some(run_id) = &args.resume {
        let state = match runner.resume(&cancel, run_id).await {
            Ok(state) => state,
            Err(err) => {
                eprintln!("Resume failed: {err}");
                return 1;
            }
        };
        print_run_summary(&state);
        return if state.status == RunStatus::Completed { 0 } else { 1 };
    }

    let goal = match assemble_goal(&args) {
        Ok(goal) => goal,
        Err(code) => return code,
    };

    let state = match runner.run_goal(&cancel, &goal).await {
        Ok(state) => state,
        Err(err) => {
            eprintln!("Agent failed: {err}");
            return 1;
        }
    };
    print_run_summary(&state);
    if state.status == RunStatus::Completed {
        0
    } else {
        1
    }
}

fn options_from_args(args: &AgentArgs) -> RunOptions {
    let mut options = RunOptions::default();
    if let Some(workspace) = &args.workspace {
        options.workspace = workspace.clone();
    }
    options.require_completion_marker = args.require_complete_marker;
    options.completion_marker = args.completion_marker.trim().to_string();
    options.disable_checkpoints = args.no_checkpoint;
    options.verbose = args.verbose;
    if let Some(max_turns) = args.max_turns {
        options.max_turns = max_turns;
    }
    if let Some(max_tool_calls) = args.max_tool_calls {
        options.max_tool_calls_per_turn = max_tool_calls;
    }
    if let Some(max_no_tool_turns) = args.max_no_tool_turns {
        options.max_consecutive_no_tool_turns = max_no_tool_turns;
    }
    if let Some(request_timeout) = args.request_timeout {
        options.request_timeout = Duration::from_secs(request_timeout);
    }
    if let Some(tool_timeout) = args.tool_timeout {
        options.tool_timeout = Duration::from_secs(tool_timeout);
    }
    options
}

fn assemble_goal(args: &AgentArgs) -> Result<String, i32> {
    let mut goal = args.goal.clone().unwrap_or_default().trim().to_string();
    if let Some(goal_file) = &args.goal_file {
        match std::fs::read_to_string(goal_file) {
            Ok(text) => {
                if !goal.is_empty() {
                    goal.push_str("\n\n");
                }
                goal.push_str(text.trim());
            }
            Err(err) => {
                eprintln!("Error reading goal file: {err}");
                return Err(1);
            }
        }
    }
    if goal.is_empty() {
        goal = args.rest.join(" ").trim().to_string();
    }
    if goal.is_empty() {
        eprintln!("Usage: celeste agent --goal \"<task>\" [--workspace <path>] [--max-turns N]");
        eprintln!("       celeste agent --resume <run-id>");
        eprintln!("       celeste agent --list-runs");
        eprintln!("       celeste agent --eval <cases.json>");
        return Err(1);
    }
    Ok(goal)
}

fn list_runs() -> i32 {
    let store = match CheckpointStore::new(None) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("Error opening run store: {err}");
            return 1;
        }
    };
    let runs = store.list(20);
    if runs.is_empty() {
        println!("No agent runs found");
        return 0;
    }

    println!("Recent Agent Runs ({}):", runs.len());
    for run in &runs {
        let mut goal_preview = run.goal.trim().to_string();
        if goal_preview.chars().count() > 60 {
            goal_preview = format!("{}...", goal_preview.chars().take(60).collect::<String>());
        }
        println!(
            "- {} [{}] turns={} tools={} updated={}\n  goal: {}",
            run.run_id,
            run.status,
            run.turn,
            run.tool_calls,
            run.updated_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S"),
            goal_preview,
        );
    }
    0
}

fn print_run_event(event: &RunEvent) {
    match event {
        RunEvent::TurnStart { turn, max_turns } => {
            println!("\n[agent] turn {turn}/{max_turns}");
        }
        RunEvent::AssistantText { text } => {
            println!("[assistant]\n{text}");
        }
        RunEvent::ToolDispatch { name } => {
            println!("[tool] {name}");
        }
        RunEvent::RunEnd { .. } => {}
    }
}

fn print_run_summary(state: &RunState) {
    println!("\nRun ID: {}", state.run_id);
    println!("Status: {}", state.status);
    println!("Turns: {}", state.turn);
    println!("Tool Calls: {}", state.tool_call_count);
    if !state.last_assistant_response.is_empty() {
        println!("\nFinal Response:\n{}", state.last_assistant_response);
    }
    if let Some(error) = &state.error {
        println!("\nError: {error}");
    }
}
