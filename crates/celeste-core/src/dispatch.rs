//! Tool dispatch protocol helpers shared by the agent loop and the
//! interactive chat surface.
//!
//! Invariants both consumers preserve: one assistant message with N tool
//! calls yields exactly N tool messages paired by id, all appended before the
//! next provider request; execution is sequential; argument parse failures
//! produce an explicit error payload rather than a silent `{}`.

use std::collections::HashMap;

use crate::types::ToolCallRef;

/// Collapse duplicate `tool_call_id`s within one turn: the later occurrence
/// replaces the earlier in place before dispatch.
pub fn dedupe_tool_calls(calls: Vec<ToolCallRef>) -> Vec<ToolCallRef> {
    let mut result: Vec<ToolCallRef> = Vec::with_capacity(calls.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    for call in calls {
        match seen.get(&call.id) {
            Some(&idx) => result[idx] = call,
            None => {
                seen.insert(call.id.clone(), result.len());
                result.push(call);
            }
        }
    }
    result
}

/// The error payload a model sees when a tool fails or its arguments cannot
/// be parsed.
pub fn error_payload(tool: &str, message: &str) -> String {
    serde_json::json!({
        "error": true,
        "tool": tool,
        "message": message,
    })
    .to_string()
}

/// Serialize a successful tool result for the model: strings are returned
/// verbatim, everything else as JSON.
pub fn format_tool_result(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
