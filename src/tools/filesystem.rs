//! Filesystem tools for CodeCLI
//!
//! `read_file`, `write_file` and `list_directory`. Paths may be absolute or
//! relative to the working directory in the tool context. Every operation is
//! checked with the permission gate before the filesystem is touched.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{CodeCliError, Result};
use crate::utils::string::{line_count, preview};

use super::registry::count_of;
use super::types::{bool_arg, str_arg, usize_arg};
use super::{Tool, ToolContext, ToolOutput};

/// Files longer than this are returned as the first numbered lines only.
pub const MAX_READ_LINES: usize = 500;

/// Maximum recursion depth of `list_directory`.
pub const MAX_LIST_DEPTH: usize = 3;

/// Directory names never listed.
const IGNORED_DIRS: &[&str] = &["node_modules", ".git", "__pycache__", ".codecli"];

fn required_path(args: &Value) -> Result<&str> {
    str_arg(args, "path")
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| CodeCliError::Tool("Missing 'path' argument".into()))
}

fn numbered(lines: &[&str], first_line: usize) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{} | {}", first_line + i, line))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// read_file
// ============================================================================

/// Read a file, optionally a 1-based inclusive line range.
///
/// # Parameters
/// - `path`: file to read (required)
/// - `startLine`, `endLine`: optional range; lines come back numbered
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Can optionally read specific line ranges."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file to read"
                },
                "startLine": {
                    "type": "integer",
                    "description": "Optional start line number (1-indexed)"
                },
                "endLine": {
                    "type": "integer",
                    "description": "Optional end line number (1-indexed, inclusive)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = required_path(&args)?;
        let resolved = ctx.resolve(path);
        let display = resolved.display().to_string();

        if !ctx.permissions.check_read(&display).await {
            return Ok(ToolOutput::permission_denied());
        }
        if !resolved.is_file() {
            return Ok(ToolOutput::error(format!("File not found: {}", display)));
        }

        let content = match tokio::fs::read(&resolved).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => return Ok(ToolOutput::error(format!("Failed to read file: {}", e))),
        };
        let lines: Vec<&str> = content.split('\n').collect();
        let total = lines.len();

        let start_line = usize_arg(&args, "startLine");
        let end_line = usize_arg(&args, "endLine");
        if start_line.is_some() || end_line.is_some() {
            let start = start_line.unwrap_or(1).max(1) - 1;
            let end = end_line.unwrap_or(total).min(total);
            let slice = if start < end { &lines[start..end] } else { &[][..] };
            return Ok(ToolOutput::ok(json!({
                "content": numbered(slice, start + 1),
                "totalLines": total,
                "range": { "start": start + 1, "end": end },
            })));
        }

        let content = if total > MAX_READ_LINES {
            format!(
                "{}\n... ({} more lines)",
                numbered(&lines[..MAX_READ_LINES], 1),
                total - MAX_READ_LINES
            )
        } else {
            content.clone()
        };
        Ok(ToolOutput::ok(json!({ "content": content, "totalLines": total })))
    }

    fn summarize_args(&self, args: &Value) -> String {
        str_arg(args, "path").unwrap_or_default().to_string()
    }

    fn describe_result(&self, result: &Value) -> Option<String> {
        result.get("content")?;
        let total = result.get("totalLines").and_then(Value::as_u64);
        Some(match total {
            Some(n) => format!("{} lines", n),
            None => "? lines".to_string(),
        })
    }
}

// ============================================================================
// write_file
// ============================================================================

/// Create, overwrite, append to, insert into or search/replace within a file.
///
/// # Parameters
/// - `path`: file to write (required)
/// - `content`: text to write
/// - `mode`: `write` (default), `append` or `insert`
/// - `insertLine`: 1-based line for `insert`
/// - `searchReplace`: `{search, replace}` replacing the first occurrence
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write or edit a file. Can create new files or edit existing ones. \
         For editing, you can replace specific content or write the entire file."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write or create"
                },
                "content": {
                    "type": "string",
                    "description": "Full content to write to the file"
                },
                "mode": {
                    "type": "string",
                    "enum": ["write", "append", "insert"],
                    "description": "Write mode: \"write\" (overwrite), \"append\" (add to end), \"insert\" (insert at line)"
                },
                "insertLine": {
                    "type": "integer",
                    "description": "Line number to insert at (only used with mode \"insert\")"
                },
                "searchReplace": {
                    "type": "object",
                    "description": "Search and replace within the file",
                    "properties": {
                        "search": { "type": "string", "description": "Text to find" },
                        "replace": { "type": "string", "description": "Replacement text" }
                    },
                    "required": ["search", "replace"]
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = required_path(&args)?;
        let resolved = ctx.resolve(path);
        let display = resolved.display().to_string();

        if !ctx.permissions.check_write(&display).await {
            return Ok(ToolOutput::permission_denied());
        }

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let exists = resolved.is_file();
        let old_content = if exists {
            let bytes = tokio::fs::read(&resolved).await?;
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            String::new()
        };
        let content = str_arg(&args, "content").unwrap_or_default();
        let mode = str_arg(&args, "mode").unwrap_or("write");

        let new_content = if let Some(sr) = args.get("searchReplace").filter(|v| v.is_object()) {
            let search = str_arg(sr, "search").unwrap_or_default();
            let replace = str_arg(sr, "replace").unwrap_or_default();
            if !exists {
                return Ok(ToolOutput::error("Cannot search/replace in non-existent file"));
            }
            if search.is_empty() || !old_content.contains(search) {
                return Ok(ToolOutput::error(format!(
                    "Search text not found in file: \"{}\"",
                    preview(search, 50)
                )));
            }
            old_content.replacen(search, replace, 1)
        } else {
            match (mode, usize_arg(&args, "insertLine")) {
                ("append", _) => format!("{}{}", old_content, content),
                ("insert", Some(line)) => {
                    let mut lines: Vec<&str> = old_content.split('\n').collect();
                    let at = line.saturating_sub(1).min(lines.len());
                    lines.insert(at, content);
                    lines.join("\n")
                }
                _ => content.to_string(),
            }
        };

        if let Err(e) = tokio::fs::write(&resolved, &new_content).await {
            return Ok(ToolOutput::error(format!("Failed to write file: {}", e)));
        }

        let lines = line_count(&new_content);
        debug!(path = %resolved.display(), lines, existed = exists, "File written");
        Ok(ToolOutput::ok(json!({
            "success": true,
            "action": if exists { "updated" } else { "created" },
            "path": display,
            "lines": lines,
        })))
    }

    fn summarize_args(&self, args: &Value) -> String {
        format!(
            "{} ({})",
            str_arg(args, "path").unwrap_or_default(),
            str_arg(args, "mode").unwrap_or("write")
        )
    }

    fn describe_result(&self, result: &Value) -> Option<String> {
        result
            .get("success")
            .and_then(Value::as_bool)
            .filter(|ok| *ok)
            .map(|_| "written".to_string())
    }
}

// ============================================================================
// list_directory
// ============================================================================

/// List a directory with types, sizes and modification dates.
///
/// # Parameters
/// - `path`: directory (defaults to the working directory)
/// - `recursive`: descend up to three levels
/// - `showHidden`: include dot-entries
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the contents of a directory with file types, sizes, and basic info."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the directory to list (defaults to cwd)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Whether to list recursively (default: false, max depth 3)"
                },
                "showHidden": {
                    "type": "boolean",
                    "description": "Whether to show hidden files (default: false)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = str_arg(&args, "path").unwrap_or(".");
        let resolved = ctx.resolve(path);
        let display = resolved.display().to_string();

        if !ctx.permissions.check_read(&display).await {
            return Ok(ToolOutput::permission_denied());
        }
        if !resolved.exists() {
            return Ok(ToolOutput::error(format!("Directory not found: {}", display)));
        }
        if !resolved.is_dir() {
            return Ok(ToolOutput::error(format!("Not a directory: {}", display)));
        }

        let options = ListOptions {
            recursive: bool_arg(&args, "recursive").unwrap_or(false),
            show_hidden: bool_arg(&args, "showHidden").unwrap_or(false),
        };
        let dir = resolved.clone();
        let entries = tokio::task::spawn_blocking(move || list_dir(&dir, options, 0))
            .await
            .map_err(|e| CodeCliError::Tool(format!("Failed to list directory: {}", e)))?;

        Ok(ToolOutput::ok(json!({
            "directory": display,
            "total": entries.len(),
            "entries": entries,
        })))
    }

    fn summarize_args(&self, args: &Value) -> String {
        str_arg(args, "path").unwrap_or(".").to_string()
    }

    fn describe_result(&self, result: &Value) -> Option<String> {
        count_of(result, "entries").map(|n| format!("{} entries", n))
    }
}

#[derive(Debug, Clone, Copy)]
struct ListOptions {
    recursive: bool,
    show_hidden: bool,
}

fn list_dir(dir: &Path, options: ListOptions, depth: usize) -> Vec<Value> {
    let mut results = Vec::new();
    let mut entries: Vec<(String, PathBuf)> = match std::fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
            .collect(),
        Err(_) => return results,
    };
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, full_path) in entries {
        if !options.show_hidden && name.starts_with('.') {
            continue;
        }
        if IGNORED_DIRS.contains(&name.as_str()) {
            continue;
        }
        let Ok(meta) = std::fs::metadata(&full_path) else {
            continue;
        };

        if meta.is_dir() {
            let children = if options.recursive && depth < MAX_LIST_DEPTH {
                Some(list_dir(&full_path, options, depth + 1))
            } else {
                None
            };
            let mut entry = json!({ "name": name, "type": "directory" });
            if let Some(count) = children.as_ref().map(Vec::len).filter(|n| *n > 0) {
                entry["children"] = json!(count);
            }
            results.push(entry);

            for mut child in children.unwrap_or_default() {
                let child_name = child["name"].as_str().unwrap_or_default().to_string();
                child["name"] = json!(format!("{}/{}", name, child_name));
                results.push(child);
            }
        } else if meta.is_file() {
            let mut entry = json!({
                "name": name,
                "type": "file",
                "size": format_size(meta.len()),
            });
            if let Ok(modified) = meta.modified() {
                let date: chrono::DateTime<chrono::Utc> = modified.into();
                entry["modified"] = json!(date.format("%Y-%m-%d").to_string());
            }
            results.push(entry);
        }
    }

    results
}

/// `512B`, `1.5KB`, `2.0MB`
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
