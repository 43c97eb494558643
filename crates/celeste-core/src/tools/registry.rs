//! Tool registry: maps tool names to schemas and handlers.
//!
//! The registry is an explicit value owned by its runner — no process-wide
//! state. Definitions and handlers are installed separately so descriptors
//! loaded from disk can be advertised to the model even when no handler is
//! wired for them yet; executing such a tool reports an error payload.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::arguments::ToolArguments;
use super::tool::Tool;
use super::validation::validate_descriptor;
use crate::error::{CelesteError, Result};
use crate::provider::ToolDefinition;

/// A tool descriptor as stored on disk (`*.json` files).
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

enum Entry {
    Handler(Arc<dyn Tool>),
    DescriptorOnly(ToolDescriptor),
}

/// Registry of tools available to a run.
#[derive(Default)]
pub struct ToolRegistry {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a tool with a handler. Rejects descriptors failing the schema
    /// predicate.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        validate_descriptor(tool.name(), tool.description(), &tool.parameters().schema)
            .map_err(CelesteError::InvalidInput)?;
        self.insert(tool.name().to_string(), Entry::Handler(tool));
        Ok(())
    }

    /// Install a schema-only descriptor (no handler). The tool is advertised
    /// to the model; execution fails until a handler is registered under the
    /// same name.
    pub fn register_descriptor(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        validate_descriptor(
            &descriptor.name,
            &descriptor.description,
            &descriptor.parameters,
        )
        .map_err(CelesteError::InvalidInput)?;
        self.insert(descriptor.name.clone(), Entry::DescriptorOnly(descriptor));
        Ok(())
    }

    fn insert(&mut self, name: String, entry: Entry) {
        if !self.entries.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.entries.insert(name, entry);
    }

    /// Scan a directory for `*.json` descriptor files. Valid descriptors
    /// register; invalid ones are skipped with a warning. Returns the number
    /// registered. A missing directory registers nothing.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            return Ok(0);
        }
        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match parse_descriptor_file(&path) {
                Ok(descriptor) => match self.register_descriptor(descriptor) {
                    Ok(()) => loaded += 1,
                    Err(err) => {
                        tracing::warn!(path = %path.display(), %err, "skipping invalid tool descriptor");
                    }
                },
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping unreadable tool descriptor");
                }
            }
        }
        Ok(loaded)
    }

    /// Execute a registered tool. Unknown names are `NotFound`; descriptors
    /// without handlers fail as tool execution errors.
    pub async fn execute(&self, name: &str, args: &ToolArguments) -> Result<serde_json::Value> {
        match self.entries.get(name) {
            None => Err(CelesteError::NotFound(format!("unknown tool: {name}"))),
            Some(Entry::DescriptorOnly(_)) => Err(CelesteError::tool(
                name,
                "no handler registered for this tool",
            )),
            Some(Entry::Handler(tool)) => tool.execute(args).await,
        }
    }

    /// Provider-facing definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name))
            .map(|entry| match entry {
                Entry::Handler(tool) => ToolDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.parameters().schema.clone(),
                },
                Entry::DescriptorOnly(d) => ToolDefinition {
                    name: d.name.clone(),
                    description: d.description.clone(),
                    parameters: d.parameters.clone(),
                },
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pure bytes → descriptor-or-error parse step for disk-loaded tools.
fn parse_descriptor_file(path: &Path) -> Result<ToolDescriptor> {
    let data = std::fs::read(path)?;
    let descriptor: ToolDescriptor = serde_json::from_slice(&data)?;
    Ok(descriptor)
}
