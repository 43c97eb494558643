//! Evaluation harness: scripted goals with textual pass/fail assertions.

use std::path::Path;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::runner::AgentRunner;
use super::state::RunStatus;
use crate::error::{CelesteError, Result};

/// One eval case: a goal plus assertions over the final assistant response.
#[derive(Debug, Clone, Deserialize)]
pub struct EvalCase {
    #[serde(default)]
    pub name: String,
    pub goal: String,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub must_contain: Vec<String>,
    #[serde(default)]
    pub must_not_contain: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EvalSuite {
    cases: Vec<EvalCase>,
}

/// Outcome of one eval case.
#[derive(Debug, Clone)]
pub struct EvalResult {
    pub case_name: String,
    pub run_id: String,
    pub status: RunStatus,
    pub passed: bool,
    pub reason: String,
}

/// Load cases from a JSON file holding either `{"cases": [...]}` or a bare
/// array of case objects.
pub fn load_eval_cases(path: &Path) -> Result<Vec<EvalCase>> {
    let data = std::fs::read(path)?;
    if let Ok(suite) = serde_json::from_slice::<EvalSuite>(&data) {
        if !suite.cases.is_empty() {
            return Ok(suite.cases);
        }
    }
    serde_json::from_slice::<Vec<EvalCase>>(&data)
        .map_err(|err| CelesteError::InvalidInput(format!("parse eval file: {err}")))
}

impl AgentRunner {
    /// Run each case against the loop with checkpoints disabled, scoring
    /// pass/fail per the harness contract.
    pub async fn run_eval(
        &self,
        cancel: &CancellationToken,
        cases: &[EvalCase],
    ) -> Vec<EvalResult> {
        let mut results = Vec::with_capacity(cases.len());
        for case in cases {
            if case.goal.trim().is_empty() {
                results.push(EvalResult {
                    case_name: case_name(case),
                    run_id: String::new(),
                    status: RunStatus::Failed,
                    passed: false,
                    reason: "empty goal".to_string(),
                });
                continue;
            }

            let mut options = self.options().clone();
            options.disable_checkpoints = true;
            if let Some(max_turns) = case.max_turns {
                if max_turns > 0 {
                    options.max_turns = max_turns;
                }
            }

            match self.run_goal_with_options(cancel, &case.goal, options).await {
                Ok(state) => {
                    let final_text = state.last_assistant_response.trim();
                    let (passed, reason) = evaluate_case(case, state.status, final_text);
                    results.push(EvalResult {
                        case_name: case_name(case),
                        run_id: state.run_id.clone(),
                        status: state.status,
                        passed,
                        reason,
                    });
                }
                Err(err) => {
                    results.push(EvalResult {
                        case_name: case_name(case),
                        run_id: String::new(),
                        status: RunStatus::Failed,
                        passed: false,
                        reason: err.to_string(),
                    });
                }
            }
        }
        results
    }
}

fn case_name(case: &EvalCase) -> String {
    if case.name.trim().is_empty() {
        case.goal.clone()
    } else {
        case.name.clone()
    }
}

fn evaluate_case(case: &EvalCase, status: RunStatus, final_text: &str) -> (bool, String) {
    if status != RunStatus::Completed {
        return (false, format!("status={status}"));
    }
    let haystack = final_text.to_lowercase();
    for required in &case.must_contain {
        if required.is_empty() {
            continue;
        }
        if !haystack.contains(&required.to_lowercase()) {
            return (false, format!("missing required text: {required:?}"));
        }
    }
    for banned in &case.must_not_contain {
        if banned.is_empty() {
            continue;
        }
        if haystack.contains(&banned.to_lowercase()) {
            return (false, format!("contains forbidden text: {banned:?}"));
        }
    }
    (true, "ok".to_string())
}
