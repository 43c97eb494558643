//! Workspace development tools.
//!
//! Five tools (`dev_list_files`, `dev_read_file`, `dev_write_file`,
//! `dev_search_files`, `dev_run_command`) operating under a single workspace
//! root injected at construction. Every path goes through
//! [`resolve_workspace_path`]; containment violations come back to the model
//! as error payloads, never as process failures.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use walkdir::WalkDir;

use super::workspace::resolve_workspace_path;
use crate::error::{CelesteError, Result};
use crate::tools::{FnTool, Tool, ToolParameters, ToolRegistry};

const MAX_READ_BYTES: usize = 200_000;
const MAX_COMMAND_OUTPUT: usize = 12_000;
const LIST_DEFAULT_ENTRIES: i64 = 200;
const LIST_MAX_ENTRIES: i64 = 1000;
const SEARCH_DEFAULT_RESULTS: i64 = 100;
const SEARCH_MAX_RESULTS: i64 = 1000;
const COMMAND_DEFAULT_TIMEOUT_SECS: i64 = 20;
const COMMAND_MAX_TIMEOUT_SECS: i64 = 300;

/// Register all five development tools against a workspace root.
pub fn register_dev_tools(registry: &mut ToolRegistry, workspace: &Path) -> Result<()> {
    let workspace = workspace.to_path_buf();
    registry.register(list_files_tool(workspace.clone()))?;
    registry.register(read_file_tool(workspace.clone()))?;
    registry.register(write_file_tool(workspace.clone()))?;
    registry.register(search_files_tool(workspace.clone()))?;
    registry.register(run_command_tool(workspace))?;
    Ok(())
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    s[..cutoff].to_string()
}

fn clamp(value: i64, default: i64, max: i64) -> usize {
    let value = if value <= 0 { default } else { value.min(max) };
    value as usize
}

fn relative_display(workspace: &Path, path: &Path) -> String {
    path.strip_prefix(workspace)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn entry_record(workspace: &Path, path: &Path, name: &str, is_dir: bool, size: u64) -> serde_json::Value {
    serde_json::json!({
        "path": relative_display(workspace, path),
        "name": name,
        "is_dir": is_dir,
        "size": size,
    })
}

/// `dev_list_files` — enumerate directory entries, optionally recursive.
pub fn list_files_tool(workspace: PathBuf) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "dev_list_files",
        "List files/directories inside the configured workspace. Use this before reading or editing files.",
        ToolParameters::object()
            .string("path", "Relative directory path inside workspace. Defaults to '.'", false)
            .boolean("recursive", "Recursively walk subdirectories when true.", false)
            .number("max_entries", "Maximum entries to return. Default 200.", false)
            .build(),
        move |args| {
            let workspace = workspace.clone();
            async move {
                let path = args.str_or("path", ".").to_string();
                let recursive = args.bool_or("recursive", false);
                let max_entries =
                    clamp(args.i64_or("max_entries", LIST_DEFAULT_ENTRIES), LIST_DEFAULT_ENTRIES, LIST_MAX_ENTRIES);

                let target = resolve_workspace_path(&workspace, &path)?;
                let mut entries = Vec::new();
                let mut truncated = false;

                if !recursive {
                    let mut read_dir = tokio::fs::read_dir(&target)
                        .await
                        .map_err(|e| CelesteError::tool("dev_list_files", format!("{path}: {e}")))?;
                    while let Some(entry) = read_dir
                        .next_entry()
                        .await
                        .map_err(|e| CelesteError::tool("dev_list_files", e.to_string()))?
                    {
                        if entries.len() >= max_entries {
                            truncated = true;
                            break;
                        }
                        let meta = entry.metadata().await.ok();
                        entries.push(entry_record(
                            &workspace,
                            &entry.path(),
                            &entry.file_name().to_string_lossy(),
                            meta.as_ref().map(|m| m.is_dir()).unwrap_or(false),
                            meta.map(|m| m.len()).unwrap_or(0),
                        ));
                    }
                } else {
                    for entry in WalkDir::new(&target).min_depth(1) {
                        let Ok(entry) = entry else { continue };
                        if entries.len() >= max_entries {
                            truncated = true;
                            break;
                        }
                        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                        entries.push(entry_record(
                            &workspace,
                            entry.path(),
                            &entry.file_name().to_string_lossy(),
                            entry.file_type().is_dir(),
                            size,
                        ));
                    }
                }

                Ok(serde_json::json!({
                    "workspace": workspace.to_string_lossy(),
                    "path": path,
                    "entries": entries,
                    "count": entries.len(),
                    "truncated": truncated,
                }))
            }
        },
    ))
}

/// `dev_read_file` — read a text file with optional 1-based line range.
pub fn read_file_tool(workspace: PathBuf) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "dev_read_file",
        "Read a text file from workspace. Supports optional line ranges.",
        ToolParameters::object()
            .string("path", "Relative file path inside workspace.", true)
            .number("start_line", "1-based inclusive start line. Defaults to 1.", false)
            .number("end_line", "1-based inclusive end line. Defaults to end-of-file.", false)
            .build(),
        move |args| {
            let workspace = workspace.clone();
            async move {
                let path = args.get_str("path")?.to_string();
                let mut start_line = args.i64_or("start_line", 1).max(1) as usize;
                let mut end_line = args.i64_or("end_line", 0);

                let target = resolve_workspace_path(&workspace, &path)?;
                let data = tokio::fs::read(&target)
                    .await
                    .map_err(|e| CelesteError::tool("dev_read_file", format!("{path}: {e}")))?;

                let truncated = data.len() > MAX_READ_BYTES;
                let text = String::from_utf8_lossy(if truncated {
                    &data[..MAX_READ_BYTES]
                } else {
                    &data[..]
                })
                .into_owned();

                let lines: Vec<&str> = text.split('\n').collect();
                let total_lines = lines.len();

                let mut end = if end_line <= 0 { total_lines } else { end_line as usize };
                if end > total_lines {
                    end = total_lines;
                }
                if start_line > end {
                    start_line = end;
                }
                end_line = end as i64;

                let content = if total_lines > 0 && start_line >= 1 {
                    lines[start_line - 1..end].join("\n")
                } else {
                    String::new()
                };

                Ok(serde_json::json!({
                    "path": path,
                    "workspace": workspace.to_string_lossy(),
                    "start_line": start_line,
                    "end_line": end_line,
                    "total_lines": total_lines,
                    "truncated": truncated,
                    "content": content,
                }))
            }
        },
    ))
}

/// `dev_write_file` — write or append text, creating parent directories.
pub fn write_file_tool(workspace: PathBuf) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "dev_write_file",
        "Write text to a workspace file. Creates parent directories automatically.",
        ToolParameters::object()
            .string("path", "Relative file path inside workspace.", true)
            .string("content", "Content to write.", true)
            .boolean("append", "Append instead of overwrite when true.", false)
            .build(),
        move |args| {
            let workspace = workspace.clone();
            async move {
                let path = args.get_str("path")?.to_string();
                let content = args.get_str("content")?.to_string();
                let append = args.bool_or("append", false);

                let target = resolve_workspace_path(&workspace, &path)?;
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        CelesteError::tool(
                            "dev_write_file",
                            format!("failed to create directories for {path}: {e}"),
                        )
                    })?;
                }

                let bytes_written = content.len();
                if append {
                    use tokio::io::AsyncWriteExt;
                    let mut file = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&target)
                        .await
                        .map_err(|e| CelesteError::tool("dev_write_file", format!("{path}: {e}")))?;
                    file.write_all(content.as_bytes())
                        .await
                        .map_err(|e| CelesteError::tool("dev_write_file", format!("{path}: {e}")))?;
                } else {
                    tokio::fs::write(&target, content.as_bytes())
                        .await
                        .map_err(|e| CelesteError::tool("dev_write_file", format!("{path}: {e}")))?;
                }

                Ok(serde_json::json!({
                    "path": path,
                    "workspace": workspace.to_string_lossy(),
                    "bytes_written": bytes_written,
                    "append": append,
                }))
            }
        },
    ))
}

/// `dev_search_files` — per-line substring search, `.git` subtrees pruned.
pub fn search_files_tool(workspace: PathBuf) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "dev_search_files",
        "Search for text in workspace files and return matching lines.",
        ToolParameters::object()
            .string("pattern", "Text pattern to search for.", true)
            .string("path", "Relative directory path to search. Defaults to '.'", false)
            .number("max_results", "Maximum matches to return. Defaults to 100.", false)
            .boolean("case_sensitive", "Use case-sensitive matching when true.", false)
            .build(),
        move |args| {
            let workspace = workspace.clone();
            async move {
                let pattern = args.get_str("pattern")?.to_string();
                if pattern.is_empty() {
                    return Err(CelesteError::tool("dev_search_files", "pattern is required"));
                }
                let path = args.str_or("path", ".").to_string();
                let max_results = clamp(
                    args.i64_or("max_results", SEARCH_DEFAULT_RESULTS),
                    SEARCH_DEFAULT_RESULTS,
                    SEARCH_MAX_RESULTS,
                );
                let case_sensitive = args.bool_or("case_sensitive", false);

                let target = resolve_workspace_path(&workspace, &path)?;
                let needle = if case_sensitive {
                    pattern.clone()
                } else {
                    pattern.to_lowercase()
                };

                let mut matches = Vec::new();
                let mut truncated = false;

                let walker = WalkDir::new(&target).into_iter().filter_entry(|entry| {
                    !(entry.file_type().is_dir() && entry.file_name() == ".git")
                });
                'walk: for entry in walker {
                    let Ok(entry) = entry else { continue };
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let Ok(data) = std::fs::read(entry.path()) else {
                        continue;
                    };
                    let text = String::from_utf8_lossy(&data);
                    for (idx, line) in text.lines().enumerate() {
                        let hit = if case_sensitive {
                            line.contains(&needle)
                        } else {
                            line.to_lowercase().contains(&needle)
                        };
                        if hit {
                            matches.push(serde_json::json!({
                                "path": relative_display(&workspace, entry.path()),
                                "line_number": idx + 1,
                                "line": line,
                            }));
                            if matches.len() >= max_results {
                                truncated = true;
                                break 'walk;
                            }
                        }
                    }
                }

                Ok(serde_json::json!({
                    "pattern": pattern,
                    "case_sensitive": case_sensitive,
                    "matches": matches,
                    "count": matches.len(),
                    "truncated": truncated,
                }))
            }
        },
    ))
}

/// `dev_run_command` — execute a shell command from the workspace root.
pub fn run_command_tool(workspace: PathBuf) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        "dev_run_command",
        "Execute a shell command from workspace root and return combined output.",
        ToolParameters::object()
            .string("command", "Shell command to execute.", true)
            .number("timeout_seconds", "Execution timeout in seconds. Defaults to 20.", false)
            .build(),
        move |args| {
            let workspace = workspace.clone();
            async move {
                let command = args.get_str("command")?.trim().to_string();
                if command.is_empty() {
                    return Err(CelesteError::tool("dev_run_command", "command is required"));
                }
                let timeout_secs = clamp(
                    args.i64_or("timeout_seconds", COMMAND_DEFAULT_TIMEOUT_SECS),
                    COMMAND_DEFAULT_TIMEOUT_SECS,
                    COMMAND_MAX_TIMEOUT_SECS,
                );

                let result = tokio::time::timeout(
                    Duration::from_secs(timeout_secs as u64),
                    tokio::process::Command::new("sh")
                        .arg("-lc")
                        .arg(&command)
                        .current_dir(&workspace)
                        .kill_on_drop(true)
                        .output(),
                )
                .await;

                let output = match result {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => {
                        return Err(CelesteError::tool("dev_run_command", e.to_string()));
                    }
                    Err(_) => {
                        // Partial output is discarded on timeout.
                        return Ok(serde_json::json!({
                            "command": command,
                            "workspace": workspace.to_string_lossy(),
                            "exit_code": -1,
                            "output": "",
                            "truncated": false,
                            "timed_out": true,
                        }));
                    }
                };

                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let mut combined = format!("{stdout}{stderr}");
                let truncated = combined.len() > MAX_COMMAND_OUTPUT;
                if truncated {
                    combined = truncate_utf8(&combined, MAX_COMMAND_OUTPUT);
                }

                Ok(serde_json::json!({
                    "command": command,
                    "workspace": workspace.to_string_lossy(),
                    "exit_code": output.status.code().unwrap_or(-1),
                    "output": combined,
                    "truncated": truncated,
                    "timed_out": false,
                }))
            }
        },
    ))
}
