//! The autonomous agent runtime: turn loop, workspace tools, checkpoints,
//! and the evaluation harness.

pub mod checkpoint;
pub mod dev_tools;
pub mod eval;
pub mod options;
pub mod runner;
pub mod state;
pub mod workspace;

pub use checkpoint::CheckpointStore;
pub use eval::{load_eval_cases, EvalCase, EvalResult};
pub use options::RunOptions;
pub use runner::{AgentRunner, RunEvent, RunEventSink};
pub use state::{RunState, RunStatus, RunSummary, Step, StepKind};
