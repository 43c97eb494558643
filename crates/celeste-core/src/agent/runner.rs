//! The autonomous agent turn loop.
//!
//! One loop per run: send the full history plus tool schemas, append the
//! assistant turn, dispatch any tool calls sequentially, checkpoint, repeat.
//! Terminal transitions: completion marker, no-progress stop, max turns,
//! request failure, cancellation.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::checkpoint::CheckpointStore;
use super::dev_tools::register_dev_tools;
use super::options::RunOptions;
use super::state::{RunState, RunStatus, RunSummary, Step};
use crate::dispatch::{dedupe_tool_calls, error_payload, format_tool_result};
use crate::error::{CelesteError, Result};
use crate::provider::{BackendRequest, ChatBackend};
use crate::tools::{ToolArguments, ToolRegistry};
use crate::types::{ChatMessage, ToolCallRef};

/// Progress notifications emitted while a run executes.
#[derive(Debug, Clone)]
pub enum RunEvent {
    TurnStart { turn: u32, max_turns: u32 },
    AssistantText { text: String },
    ToolDispatch { name: String },
    RunEnd { status: RunStatus },
}

/// Callback receiving [`RunEvent`]s, e.g. the CLI's verbose printer.
pub type RunEventSink = Arc<dyn Fn(&RunEvent) + Send + Sync>;

/// Drives goal-directed runs against a [`ChatBackend`].
///
/// Single-threaded cooperative per run: no parallelism across turns or
/// across tools within a turn, so workspace mutations stay serializable.
pub struct AgentRunner {
    backend: Arc<dyn ChatBackend>,
    registry: ToolRegistry,
    store: CheckpointStore,
    options: RunOptions,
    event_sink: Option<RunEventSink>,
}

impl AgentRunner {
    /// Create a runner. Normalizes options (workspace resolution, limit
    /// clamping) and installs the workspace development tools.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        options: RunOptions,
        store: CheckpointStore,
    ) -> Result<Self> {
        let options = options.normalized()?;
        let mut registry = ToolRegistry::new();
        register_dev_tools(&mut registry, &options.workspace)?;
        Ok(Self {
            backend,
            registry,
            store,
            options,
            event_sink: None,
        })
    }

    /// Attach an event sink.
    pub fn with_event_sink(mut self, sink: RunEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Mutable registry access for installing custom or disk-loaded tools.
    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    /// List recent run summaries, newest first.
    pub fn list_runs(&self, limit: usize) -> Vec<RunSummary> {
        self.store.list(limit)
    }

    /// Start a fresh run toward `goal`.
    ///
    /// Transport, timeout, and cancellation failures are recorded on the
    /// returned state (`status == Failed`); only pre-flight validation
    /// returns `Err`.
    pub async fn run_goal(&self, cancel: &CancellationToken, goal: &str) -> Result<RunState> {
        self.run_goal_with_options(cancel, goal, self.options.clone())
            .await
    }

    pub(crate) async fn run_goal_with_options(
        &self,
        cancel: &CancellationToken,
        goal: &str,
        options: RunOptions,
    ) -> Result<RunState> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(CelesteError::InvalidInput("goal is required".to_string()));
        }

        let mut state = RunState::new(goal, options);
        state
            .messages
            .push(ChatMessage::system(build_system_prompt(&state.options)));
        state.messages.push(ChatMessage::user(goal));
        state.steps.push(Step::goal(goal));

        Ok(self.drive(cancel, state).await)
    }

    /// Rehydrate a checkpointed run and continue it.
    pub async fn resume(&self, cancel: &CancellationToken, run_id: &str) -> Result<RunState> {
        let mut state = self.store.load(run_id)?;
        if state.options.workspace.as_os_str().is_empty() {
            state.options.workspace = self.options.workspace.clone();
        }
        if state.options.completion_marker.trim().is_empty() {
            state.options.completion_marker = self.options.completion_marker.clone();
        }
        Ok(self.drive(cancel, state).await)
    }

    async fn drive(&self, cancel: &CancellationToken, mut state: RunState) -> RunState {
        self.save_checkpoint(&mut state);

        while state.turn < state.options.max_turns {
            state.turn += 1;
            state.status = RunStatus::Running;
            self.emit(RunEvent::TurnStart {
                turn: state.turn,
                max_turns: state.options.max_turns,
            });

            let request = BackendRequest {
                messages: state.messages.clone(),
                tools: self.registry.definitions(),
            };
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    Err(CelesteError::Cancelled("run cancelled".to_string()))
                }
                result = tokio::time::timeout(
                    state.options.request_timeout,
                    self.backend.send_sync(&request),
                ) => match result {
                    Err(_) => Err(CelesteError::Timeout(
                        state.options.request_timeout.as_millis() as u64,
                    )),
                    Ok(result) => result,
                },
            };
            let response = match outcome {
                Ok(response) => response,
                Err(err) => return self.fail(state, err),
            };

            // Cap before appending so every echoed call gets a paired tool
            // message before the next request.
            let mut tool_calls = dedupe_tool_calls(response.tool_calls);
            tool_calls.truncate(state.options.max_tool_calls_per_turn);
            state.messages.push(ChatMessage::assistant_with_calls(
                response.text.clone(),
                tool_calls.clone(),
            ));
            state.last_assistant_response = response.text.trim().to_string();
            state
                .steps
                .push(Step::assistant(state.turn, &state.last_assistant_response));
            if !state.last_assistant_response.is_empty() {
                self.emit(RunEvent::AssistantText {
                    text: state.last_assistant_response.clone(),
                });
            }

            if tool_calls.is_empty() {
                state.consecutive_no_tool_turns += 1;
                if is_completion_response(&state.last_assistant_response, &state.options) {
                    return self.finish(state, RunStatus::Completed);
                }
                if state.consecutive_no_tool_turns >= state.options.max_consecutive_no_tool_turns {
                    return self.finish(state, RunStatus::NoProgressStopped);
                }
                state
                    .messages
                    .push(ChatMessage::user(build_continue_prompt(&state.options)));
                self.save_checkpoint(&mut state);
                continue;
            }

            state.consecutive_no_tool_turns = 0;
            for call in &tool_calls {
                match self.execute_tool_call(cancel, &mut state, call).await {
                    Ok(message) => {
                        state.messages.push(message);
                        state.tool_call_count += 1;
                    }
                    Err(err) => return self.fail(state, err),
                }
            }
            self.save_checkpoint(&mut state);
        }

        self.finish(state, RunStatus::MaxTurnsReached)
    }

    /// Run one tool call to a tool message. Argument parse failures, handler
    /// errors, and tool timeouts become error payloads; only cancellation
    /// escapes as `Err`.
    async fn execute_tool_call(
        &self,
        cancel: &CancellationToken,
        state: &mut RunState,
        call: &ToolCallRef,
    ) -> Result<ChatMessage> {
        self.emit(RunEvent::ToolDispatch {
            name: call.name.clone(),
        });

        let content = match serde_json::from_str::<serde_json::Value>(&call.arguments) {
            Err(_) => error_payload(&call.name, "invalid tool arguments JSON"),
            Ok(value) => {
                let args = ToolArguments::new(value);
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(CelesteError::Cancelled(
                            "run cancelled during tool execution".to_string(),
                        ));
                    }
                    outcome = tokio::time::timeout(
                        state.options.tool_timeout,
                        self.registry.execute(&call.name, &args),
                    ) => outcome,
                };
                match outcome {
                    Err(_) => error_payload(
                        &call.name,
                        &format!(
                            "tool timed out after {}s",
                            state.options.tool_timeout.as_secs()
                        ),
                    ),
                    Ok(Ok(value)) => format_tool_result(value),
                    Ok(Err(err)) => error_payload(&call.name, &err.to_string()),
                }
            }
        };

        state
            .steps
            .push(Step::tool(state.turn, &call.name, &content, &call.id));
        Ok(ChatMessage::tool(
            call.id.clone(),
            call.name.clone(),
            content,
        ))
    }

    fn finish(&self, mut state: RunState, status: RunStatus) -> RunState {
        state.status = status;
        state.completed_at = Some(Utc::now());
        self.save_checkpoint(&mut state);
        self.emit(RunEvent::RunEnd { status });
        state
    }

    fn fail(&self, mut state: RunState, err: CelesteError) -> RunState {
        state.status = RunStatus::Failed;
        state.error = Some(err.to_string());
        self.save_checkpoint(&mut state);
        self.emit(RunEvent::RunEnd {
            status: RunStatus::Failed,
        });
        state
    }

    /// Checkpoint failures never abort the loop.
    fn save_checkpoint(&self, state: &mut RunState) {
        if state.options.disable_checkpoints {
            return;
        }
        if let Err(err) = self.store.save(state) {
            tracing::warn!(run_id = %state.run_id, %err, "failed to save checkpoint");
        }
    }

    fn emit(&self, event: RunEvent) {
        if let Some(sink) = &self.event_sink {
            sink(&event);
        }
    }
}

fn is_completion_response(content: &str, options: &RunOptions) -> bool {
    let text = content.trim();
    if text.is_empty() {
        return false;
    }
    if !options.completion_marker.is_empty()
        && text
            .to_uppercase()
            .contains(&options.completion_marker.to_uppercase())
    {
        return true;
    }
    !options.require_completion_marker
}

fn build_continue_prompt(options: &RunOptions) -> String {
    format!(
        "Continue working toward the goal. Use tools when needed. If you are done, respond with '{}' followed by final deliverables and validation notes.",
        options.completion_marker
    )
}

fn build_system_prompt(options: &RunOptions) -> String {
    format!(
        "You are Celeste Agent, an autonomous execution loop for software and content tasks.\n\n\
         Execution contract:\n\
         1. Work iteratively until the objective is complete.\n\
         2. Prefer using available tools to inspect files, search code, modify files, and validate outcomes.\n\
         3. Keep responses concise and action-focused.\n\
         4. When complete, begin your final response with \"{}\" and include:\n   \
            - what changed\n   \
            - what validations ran\n   \
            - any remaining risks/open items\n\
         5. If blocked, clearly describe the blocker and the next required user action.\n\n\
         Current workspace root: {}",
        options.completion_marker,
        options.workspace.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::BackendResponse;
    use crate::tools::{FnTool, ToolParameters};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Backend returning a scripted sequence of turns.
    struct ScriptedBackend {
        responses: Mutex<VecDeque<Result<BackendResponse>>>,
        requests: Mutex<Vec<BackendRequest>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Result<BackendResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send_sync(&self, request: &BackendRequest) -> Result<BackendResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CelesteError::api(500, "script exhausted")))
        }
    }

    /// Backend that never answers; used for cancellation tests.
    struct PendingBackend;

    #[async_trait]
    impl ChatBackend for PendingBackend {
        fn name(&self) -> &str {
            "pending"
        }

        async fn send_sync(&self, _request: &BackendRequest) -> Result<BackendResponse> {
            std::future::pending().await
        }
    }

    fn text_turn(text: &str) -> Result<BackendResponse> {
        Ok(BackendResponse {
            text: text.to_string(),
            tool_calls: Vec::new(),
            usage: None,
        })
    }

    fn tool_turn(text: &str, calls: Vec<(&str, &str, &str)>) -> Result<BackendResponse> {
        Ok(BackendResponse {
            text: text.to_string(),
            tool_calls: calls
                .into_iter()
                .map(|(id, name, arguments)| ToolCallRef {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                })
                .collect(),
            usage: None,
        })
    }

    struct Fixture {
        workspace: tempfile::TempDir,
        checkpoints: tempfile::TempDir,
        runner: AgentRunner,
        cancel: CancellationToken,
    }

    fn fixture(backend: Arc<dyn ChatBackend>, mut options: RunOptions) -> Fixture {
        let workspace = tempfile::tempdir().unwrap();
        let checkpoints = tempfile::tempdir().unwrap();
        options.workspace = workspace.path().to_path_buf();
        let store = CheckpointStore::new(Some(checkpoints.path().to_path_buf())).unwrap();
        let runner = AgentRunner::new(backend, options, store).unwrap();
        Fixture {
            workspace,
            checkpoints,
            runner,
            cancel: CancellationToken::new(),
        }
    }

    fn counting_tool(name: &str, invocations: Arc<AtomicUsize>) -> Arc<dyn crate::tools::Tool> {
        Arc::new(FnTool::new(
            name,
            "counts invocations",
            ToolParameters::object().string("x", "Anything", false).build(),
            move |args| {
                let invocations = invocations.clone();
                async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::json!({"x": args.str_or("x", "")}))
                }
            },
        ))
    }

    // ── terminal transitions ──────────────────────────────────────────────

    #[tokio::test]
    async fn completes_immediately_on_marker_without_tools() {
        let backend = ScriptedBackend::new(vec![text_turn("TASK_COMPLETE: finished")]);
        let f = fixture(backend.clone(), RunOptions::default());

        let state = f.runner.run_goal(&f.cancel, "say done").await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.turn, 1);
        assert_eq!(state.tool_call_count, 0);
        assert_eq!(state.last_assistant_response, "TASK_COMPLETE: finished");
        assert!(state.completed_at.is_some());
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn reads_a_file_then_completes() {
        let backend = ScriptedBackend::new(vec![
            tool_turn("", vec![("c1", "dev_read_file", r#"{"path":"README.md"}"#)]),
            text_turn("TASK_COMPLETE: read 2 lines"),
        ]);
        let f = fixture(backend.clone(), RunOptions::default());
        std::fs::write(f.workspace.path().join("README.md"), "hello\nworld").unwrap();

        let state = f.runner.run_goal(&f.cancel, "read readme").await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.turn, 2);
        assert_eq!(state.tool_call_count, 1);

        let tool_messages: Vec<&ChatMessage> = state
            .messages
            .iter()
            .filter(|m| matches!(m, ChatMessage::Tool { .. }))
            .collect();
        assert_eq!(tool_messages.len(), 1);
        match tool_messages[0] {
            ChatMessage::Tool {
                tool_call_id,
                content,
                ..
            } => {
                assert_eq!(tool_call_id, "c1");
                let payload: serde_json::Value = serde_json::from_str(content).unwrap();
                assert_eq!(payload["total_lines"], 2);
                assert_eq!(payload["content"], "hello\nworld");
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn argument_parse_error_is_surfaced_and_loop_continues() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let backend = ScriptedBackend::new(vec![
            tool_turn("", vec![("c1", "counter", r#"{"path":}"#)]),
            text_turn("TASK_COMPLETE: recovered"),
        ]);
        let mut f = fixture(backend.clone(), RunOptions::default());
        f.runner
            .registry_mut()
            .register(counting_tool("counter", invocations.clone()))
            .unwrap();

        let state = f.runner.run_goal(&f.cancel, "call badly").await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.turn, 2);
        assert_eq!(invocations.load(Ordering::SeqCst), 0, "handler must not run");

        let tool_msg = state
            .messages
            .iter()
            .find_map(|m| match m {
                ChatMessage::Tool {
                    tool_call_id,
                    content,
                    ..
                } if tool_call_id == "c1" => Some(content.clone()),
                _ => None,
            })
            .expect("tool message for c1");
        let payload: serde_json::Value = serde_json::from_str(&tool_msg).unwrap();
        assert_eq!(payload["error"], true);
        assert_eq!(payload["message"], "invalid tool arguments JSON");
    }

    #[tokio::test]
    async fn path_escape_is_reported_to_the_model_not_the_caller() {
        let backend = ScriptedBackend::new(vec![
            tool_turn("", vec![("c1", "dev_read_file", r#"{"path":"../outside"}"#)]),
            text_turn("TASK_COMPLETE: understood"),
        ]);
        let f = fixture(backend.clone(), RunOptions::default());

        let state = f.runner.run_goal(&f.cancel, "escape").await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        let tool_msg = state
            .messages
            .iter()
            .find_map(|m| match m {
                ChatMessage::Tool { content, .. } => Some(content.clone()),
                _ => None,
            })
            .unwrap();
        let payload: serde_json::Value = serde_json::from_str(&tool_msg).unwrap();
        assert_eq!(payload["error"], true);
        assert!(
            payload["message"].as_str().unwrap().contains("escapes workspace"),
            "got: {tool_msg}"
        );
        // The workspace itself was left untouched.
        assert_eq!(std::fs::read_dir(f.workspace.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn stops_after_consecutive_no_tool_turns() {
        let backend = ScriptedBackend::new(vec![text_turn("thinking..."), text_turn("thinking...")]);
        let options = RunOptions {
            max_consecutive_no_tool_turns: 2,
            max_turns: 10,
            ..RunOptions::default()
        };
        let f = fixture(backend.clone(), options);

        let state = f.runner.run_goal(&f.cancel, "stall").await.unwrap();

        assert_eq!(state.status, RunStatus::NoProgressStopped);
        assert_eq!(state.turn, 2);
        assert_eq!(state.consecutive_no_tool_turns, 2);
        assert_eq!(backend.request_count(), 2);
    }

    #[tokio::test]
    async fn resume_continues_from_checkpoint_history() {
        let checkpoints = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(Some(checkpoints.path().to_path_buf())).unwrap();

        // A run interrupted after two turns, checkpointed as still running.
        let options = RunOptions {
            workspace: workspace.path().to_path_buf(),
            ..RunOptions::default()
        }
        .normalized()
        .unwrap();
        let mut interrupted = RunState::new("finish the job", options);
        interrupted
            .messages
            .push(ChatMessage::system("You are Celeste Agent."));
        interrupted.messages.push(ChatMessage::user("finish the job"));
        interrupted.messages.push(ChatMessage::assistant("working on it"));
        interrupted
            .messages
            .push(ChatMessage::user("Continue working toward the goal."));
        interrupted.messages.push(ChatMessage::assistant("almost there"));
        interrupted.turn = 2;
        interrupted.consecutive_no_tool_turns = 1;
        store.save(&mut interrupted).unwrap();

        let loaded = store.load(&interrupted.run_id).unwrap();
        assert_eq!(loaded.turn, 2);
        assert_eq!(loaded.status, RunStatus::Running);

        let backend = ScriptedBackend::new(vec![text_turn("TASK_COMPLETE: ok")]);
        let runner = AgentRunner::new(
            backend.clone(),
            RunOptions {
                workspace: workspace.path().to_path_buf(),
                ..RunOptions::default()
            },
            CheckpointStore::new(Some(checkpoints.path().to_path_buf())).unwrap(),
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let state = runner.resume(&cancel, &interrupted.run_id).await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.turn, 3);
        assert_eq!(state.run_id, interrupted.run_id);
        // Pre-checkpoint history is intact under the new turn's messages.
        assert_eq!(state.messages[1].text(), "finish the job");
        assert_eq!(state.messages[4].text(), "almost there");
    }

    #[tokio::test]
    async fn resume_unknown_run_is_not_found() {
        let backend = ScriptedBackend::new(vec![]);
        let f = fixture(backend, RunOptions::default());
        let err = f
            .runner
            .resume(&f.cancel, "20990101-000000.000000000")
            .await
            .unwrap_err();
        assert!(matches!(err, CelesteError::NotFound(_)));
    }

    // ── guards and limits ─────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_goal_is_invalid_input() {
        let backend = ScriptedBackend::new(vec![]);
        let f = fixture(backend, RunOptions::default());
        let err = f.runner.run_goal(&f.cancel, "   ").await.unwrap_err();
        assert!(matches!(err, CelesteError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn dispatches_only_the_first_k_tool_calls() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let backend = ScriptedBackend::new(vec![
            tool_turn(
                "",
                vec![
                    ("c1", "counter", r#"{"x":"1"}"#),
                    ("c2", "counter", r#"{"x":"2"}"#),
                    ("c3", "counter", r#"{"x":"3"}"#),
                    ("c4", "counter", r#"{"x":"4"}"#),
                    ("c5", "counter", r#"{"x":"5"}"#),
                ],
            ),
            text_turn("TASK_COMPLETE: capped"),
        ]);
        let options = RunOptions {
            max_tool_calls_per_turn: 2,
            ..RunOptions::default()
        };
        let mut f = fixture(backend.clone(), options);
        f.runner
            .registry_mut()
            .register(counting_tool("counter", invocations.clone()))
            .unwrap();

        let state = f.runner.run_goal(&f.cancel, "burst").await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.tool_call_count, 2);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);

        // The two dispatched calls pair in order after the assistant message,
        // which echoes only the dispatched subset.
        let ids: Vec<&str> = state
            .messages
            .iter()
            .filter_map(|m| match m {
                ChatMessage::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        let echoed = state
            .messages
            .iter()
            .find(|m| !m.tool_calls().is_empty())
            .unwrap();
        assert_eq!(echoed.tool_calls().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_tool_call_ids_are_replaced_by_later_occurrence() {
        let backend = ScriptedBackend::new(vec![
            tool_turn(
                "",
                vec![
                    ("dup", "counter", r#"{"x":"first"}"#),
                    ("dup", "counter", r#"{"x":"second"}"#),
                ],
            ),
            text_turn("TASK_COMPLETE: deduped"),
        ]);
        let mut f = fixture(backend.clone(), RunOptions::default());
        f.runner
            .registry_mut()
            .register(counting_tool("counter", Arc::new(AtomicUsize::new(0))))
            .unwrap();

        let state = f.runner.run_goal(&f.cancel, "dup").await.unwrap();

        let tool_contents: Vec<&str> = state
            .messages
            .iter()
            .filter_map(|m| match m {
                ChatMessage::Tool { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tool_contents.len(), 1);
        assert!(tool_contents[0].contains("second"), "got {tool_contents:?}");
        assert_eq!(state.tool_call_count, 1);
    }

    #[tokio::test]
    async fn injects_continue_prompt_with_marker_instruction() {
        let backend = ScriptedBackend::new(vec![
            text_turn("still going"),
            text_turn("TASK_COMPLETE: done"),
        ]);
        let f = fixture(backend.clone(), RunOptions::default());

        let state = f.runner.run_goal(&f.cancel, "nudge me").await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.turn, 2);
        let continue_prompt = state
            .messages
            .iter()
            .filter_map(|m| match m {
                ChatMessage::User { content, .. } if content.contains("Continue working") => {
                    Some(content.clone())
                }
                _ => None,
            })
            .next()
            .expect("continue prompt");
        assert!(continue_prompt.contains("TASK_COMPLETE:"));
    }

    #[tokio::test]
    async fn max_turns_guard_stops_the_loop() {
        let backend = ScriptedBackend::new(vec![text_turn("thinking")]);
        let options = RunOptions {
            max_turns: 1,
            ..RunOptions::default()
        };
        let f = fixture(backend.clone(), options);

        let state = f.runner.run_goal(&f.cancel, "one shot").await.unwrap();

        assert_eq!(state.status, RunStatus::MaxTurnsReached);
        assert_eq!(state.turn, 1);
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn single_no_tool_limit_stops_in_one_turn() {
        let backend = ScriptedBackend::new(vec![text_turn("thinking")]);
        let options = RunOptions {
            max_turns: 1,
            max_consecutive_no_tool_turns: 1,
            ..RunOptions::default()
        };
        let f = fixture(backend, options);

        let state = f.runner.run_goal(&f.cancel, "one shot").await.unwrap();

        assert_eq!(state.status, RunStatus::NoProgressStopped);
        assert_eq!(state.turn, 1);
    }

    #[tokio::test]
    async fn completes_without_marker_when_not_required() {
        let backend = ScriptedBackend::new(vec![text_turn("all wrapped up")]);
        let options = RunOptions {
            require_completion_marker: false,
            ..RunOptions::default()
        };
        let f = fixture(backend, options);

        let state = f.runner.run_goal(&f.cancel, "loose mode").await.unwrap();
        assert_eq!(state.status, RunStatus::Completed);
        assert_eq!(state.turn, 1);
    }

    #[tokio::test]
    async fn marker_matching_is_case_insensitive() {
        let backend = ScriptedBackend::new(vec![text_turn("task_complete: lowercase")]);
        let f = fixture(backend, RunOptions::default());
        let state = f.runner.run_goal(&f.cancel, "case test").await.unwrap();
        assert_eq!(state.status, RunStatus::Completed);
    }

    // ── failures ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn request_error_fails_the_run_and_checkpoints_it() {
        let backend = ScriptedBackend::new(vec![Err(CelesteError::api(500, "backend down"))]);
        let f = fixture(backend, RunOptions::default());

        let state = f.runner.run_goal(&f.cancel, "doomed").await.unwrap();

        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.error.as_ref().unwrap().contains("backend down"));

        let reloaded = CheckpointStore::new(Some(f.checkpoints.path().to_path_buf()))
            .unwrap()
            .load(&state.run_id)
            .unwrap();
        assert_eq!(reloaded.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn request_timeout_fails_the_run() {
        let options = RunOptions {
            request_timeout: Duration::from_millis(50),
            ..RunOptions::default()
        };
        let f = fixture(Arc::new(PendingBackend), options);

        let state = f.runner.run_goal(&f.cancel, "slow model").await.unwrap();

        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.error.as_ref().unwrap().contains("Timeout"));
    }

    #[tokio::test]
    async fn cancellation_fails_the_run_with_cause() {
        let f = fixture(Arc::new(PendingBackend), RunOptions::default());
        f.cancel.cancel();

        let state = f.runner.run_goal(&f.cancel, "cancelled").await.unwrap();

        assert_eq!(state.status, RunStatus::Failed);
        assert!(state.error.as_ref().unwrap().contains("Cancelled"));
    }

    #[tokio::test]
    async fn tool_timeout_becomes_an_error_payload_and_loop_continues() {
        let backend = ScriptedBackend::new(vec![
            tool_turn("", vec![("c1", "slow", "{}")]),
            text_turn("TASK_COMPLETE: moved on"),
        ]);
        let options = RunOptions {
            tool_timeout: Duration::from_millis(50),
            ..RunOptions::default()
        };
        let mut f = fixture(backend, options);
        f.runner
            .registry_mut()
            .register(Arc::new(FnTool::new(
                "slow",
                "sleeps past the timeout",
                ToolParameters::empty(),
                |_args| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(serde_json::json!({"done": true}))
                },
            )))
            .unwrap();

        let state = f.runner.run_goal(&f.cancel, "slow tool").await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        let tool_msg = state
            .messages
            .iter()
            .find_map(|m| match m {
                ChatMessage::Tool { content, .. } => Some(content.clone()),
                _ => None,
            })
            .unwrap();
        assert!(tool_msg.contains("timed out"), "got: {tool_msg}");
    }

    #[tokio::test]
    async fn unknown_tool_name_becomes_an_error_payload() {
        let backend = ScriptedBackend::new(vec![
            tool_turn("", vec![("c1", "ghost_tool", "{}")]),
            text_turn("TASK_COMPLETE: noted"),
        ]);
        let f = fixture(backend, RunOptions::default());

        let state = f.runner.run_goal(&f.cancel, "ghost").await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        let tool_msg = state
            .messages
            .iter()
            .find_map(|m| match m {
                ChatMessage::Tool { content, .. } => Some(content.clone()),
                _ => None,
            })
            .unwrap();
        assert!(tool_msg.contains("unknown tool"), "got: {tool_msg}");
    }

    // ── checkpoints and events ────────────────────────────────────────────

    #[tokio::test]
    async fn disabled_checkpoints_write_nothing() {
        let backend = ScriptedBackend::new(vec![text_turn("TASK_COMPLETE: quiet")]);
        let options = RunOptions {
            disable_checkpoints: true,
            ..RunOptions::default()
        };
        let f = fixture(backend, options);

        let state = f.runner.run_goal(&f.cancel, "no trace").await.unwrap();

        assert_eq!(state.status, RunStatus::Completed);
        let runs: Vec<_> = std::fs::read_dir(
            f.checkpoints.path().join("agent").join("runs"),
        )
        .unwrap()
        .collect();
        assert!(runs.is_empty());
    }

    #[tokio::test]
    async fn list_runs_returns_finished_run() {
        let backend = ScriptedBackend::new(vec![text_turn("TASK_COMPLETE: listed")]);
        let f = fixture(backend, RunOptions::default());

        let state = f.runner.run_goal(&f.cancel, "list me").await.unwrap();
        let listed = f.runner.list_runs(10);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].run_id, state.run_id);
        assert_eq!(listed[0].status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn event_sink_sees_turns_tools_and_end() {
        let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let backend = ScriptedBackend::new(vec![
            tool_turn("", vec![("c1", "dev_list_files", "{}")]),
            text_turn("TASK_COMPLETE: events"),
        ]);
        let f = fixture(backend, RunOptions::default());
        let runner = f.runner.with_event_sink(Arc::new(move |event| {
            let tag = match event {
                RunEvent::TurnStart { turn, .. } => format!("turn:{turn}"),
                RunEvent::AssistantText { .. } => "assistant".to_string(),
                RunEvent::ToolDispatch { name } => format!("tool:{name}"),
                RunEvent::RunEnd { status } => format!("end:{status}"),
            };
            sink_events.lock().unwrap().push(tag);
        }));

        runner.run_goal(&f.cancel, "emit").await.unwrap();

        let seen = events.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "turn:1",
                "tool:dev_list_files",
                "turn:2",
                "assistant",
                "end:completed",
            ]
        );
    }

    // ── eval harness ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn run_eval_scores_cases_against_the_loop() {
        use crate::agent::eval::EvalCase;

        // Case 1 completes with the required text; case 2 stalls out.
        let backend = ScriptedBackend::new(vec![
            text_turn("TASK_COMPLETE: wrote the summary"),
            text_turn("thinking"),
            text_turn("thinking"),
            text_turn("thinking"),
        ]);
        let f = fixture(backend, RunOptions::default());

        let cases = vec![
            EvalCase {
                name: "summary".to_string(),
                goal: "write a summary".to_string(),
                max_turns: None,
                must_contain: vec!["summary".to_string()],
                must_not_contain: vec!["panic".to_string()],
            },
            EvalCase {
                name: "stall".to_string(),
                goal: "never finish".to_string(),
                max_turns: None,
                must_contain: vec![],
                must_not_contain: vec![],
            },
            EvalCase {
                name: "blank".to_string(),
                goal: "   ".to_string(),
                max_turns: None,
                must_contain: vec![],
                must_not_contain: vec![],
            },
        ];
        let results = f.runner.run_eval(&f.cancel, &cases).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].passed);
        assert_eq!(results[0].reason, "ok");
        assert!(!results[1].passed);
        assert_eq!(results[1].reason, "status=no_progress_stopped");
        assert!(!results[2].passed);
        assert_eq!(results[2].reason, "empty goal");

        // Eval runs never checkpoint.
        let runs: Vec<_> =
            std::fs::read_dir(f.checkpoints.path().join("agent").join("runs"))
                .unwrap()
                .collect();
        assert!(runs.is_empty());
    }

    // ── prompts ───────────────────────────────────────────────────────────

    #[test]
    fn system_prompt_names_marker_and_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let options = RunOptions {
            workspace: dir.path().to_path_buf(),
            ..RunOptions::default()
        }
        .normalized()
        .unwrap();
        let prompt = build_system_prompt(&options);
        assert!(prompt.contains("TASK_COMPLETE:"));
        assert!(prompt.contains(&options.workspace.display().to_string()));
    }

    #[test]
    fn completion_detection_requires_nonempty_text() {
        let options = RunOptions {
            require_completion_marker: false,
            ..RunOptions::default()
        };
        assert!(!is_completion_response("   ", &options));
        assert!(is_completion_response("anything", &options));
    }
}
