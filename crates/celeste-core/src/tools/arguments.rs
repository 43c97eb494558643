//! Typed access to tool call arguments.
//!
//! Arguments stay raw JSON until dispatch; each handler parses what it needs
//! here. Coercion rules (numeric strings → numbers, etc.) are deliberately
//! local to this type rather than applied globally.

use crate::error::CelesteError;

/// Wrapper around parsed tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Get a required string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, CelesteError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| CelesteError::ToolArgument(format!("missing string argument: {key}")))
    }

    /// Get a string argument, falling back to a default.
    pub fn str_or<'a>(&'a self, key: &str, fallback: &'a str) -> &'a str {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(fallback)
    }

    /// Get an integer argument with number-or-string coercion, falling back
    /// to a default.
    pub fn i64_or(&self, key: &str, fallback: i64) -> i64 {
        match self.value.get(key) {
            Some(serde_json::Value::Number(n)) => {
                n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(fallback)
            }
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(fallback),
            _ => fallback,
        }
    }

    /// Get a boolean argument with string coercion, falling back to a default.
    pub fn bool_or(&self, key: &str, fallback: bool) -> bool {
        match self.value.get(key) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(fallback),
            _ => fallback,
        }
    }
}
