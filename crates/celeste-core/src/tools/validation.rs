//! Validate tool descriptors before exposing them to the model.
//!
//! The same predicate gates built-in tools and descriptors loaded from disk:
//! object-typed root, a `properties` map with allowed types, and a `required`
//! list naming only declared properties.

use std::sync::OnceLock;

use regex::Regex;

const ALLOWED_TYPES: &[&str] = &["string", "number", "integer", "boolean", "object", "array"];

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[A-Za-z0-9_-]{1,64}$").expect("valid tool name pattern"))
}

/// Validate a tool descriptor, returning a description of the first
/// violation found.
pub fn validate_descriptor(
    name: &str,
    description: &str,
    parameters: &serde_json::Value,
) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("tool name is required".to_string());
    }
    if !name_pattern().is_match(name) {
        return Err(format!(
            "tool name '{name}' must match ^[A-Za-z0-9_-]{{1,64}}$"
        ));
    }

    if description.trim().is_empty() {
        return Err("tool description is required".to_string());
    }

    let root = parameters
        .as_object()
        .ok_or_else(|| "tool parameters must be an object".to_string())?;

    match root.get("type").and_then(|v| v.as_str()) {
        Some("object") => {}
        _ => return Err("tool parameters.type must be 'object'".to_string()),
    }

    let properties = root
        .get("properties")
        .ok_or_else(|| "tool parameters.properties is required".to_string())?
        .as_object()
        .ok_or_else(|| "tool parameters.properties must be an object".to_string())?;

    for (prop_name, prop) in properties {
        let prop = prop
            .as_object()
            .ok_or_else(|| format!("property '{prop_name}' must be an object"))?;
        let prop_type = prop
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| format!("property '{prop_name}' must define a string type"))?;
        if !ALLOWED_TYPES.contains(&prop_type) {
            return Err(format!(
                "property '{prop_name}' has unsupported type '{prop_type}'"
            ));
        }
    }

    if let Some(required) = root.get("required") {
        let required = required
            .as_array()
            .ok_or_else(|| "tool parameters.required must be an array of strings".to_string())?;
        for (idx, field) in required.iter().enumerate() {
            let field = field
                .as_str()
                .ok_or_else(|| format!("required[{idx}] must be a string"))?;
            if !properties.contains_key(field) {
                return Err(format!(
                    "required field '{field}' is not declared in properties"
                ));
            }
        }
    }

    Ok(())
}
