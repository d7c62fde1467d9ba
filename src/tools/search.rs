//! Search tools for CodeCLI
//!
//! `file_search` finds paths by glob pattern; `code_search` greps file
//! contents with a regex. Both check read permission on the search root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};

use crate::error::{CodeCliError, Result};

use super::registry::count_of;
use super::types::{bool_arg, str_arg, usize_arg};
use super::{Tool, ToolContext, ToolOutput};

/// Default cap on returned matches.
pub const DEFAULT_MAX_RESULTS: usize = 50;

/// `code_search` does not descend deeper than this.
pub const MAX_SEARCH_DEPTH: usize = 8;

/// Path components excluded from `file_search` results.
const GLOB_IGNORED: &[&str] = &["node_modules", ".git", ".codecli"];

/// Bytes inspected when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8000;

fn search_root(args: &Value, ctx: &ToolContext) -> PathBuf {
    match str_arg(args, "directory").filter(|d| !d.trim().is_empty()) {
        Some(dir) => ctx.resolve(dir),
        None => ctx.workdir().to_path_buf(),
    }
}

fn relative_display(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// file_search
// ============================================================================

/// Find files and directories matching a glob pattern.
///
/// # Parameters
/// - `pattern`: glob such as `**/*.rs` (required)
/// - `directory`: search root (defaults to the working directory)
/// - `maxResults`: cap on returned matches (default 50)
pub struct FileSearchTool;

#[async_trait]
impl Tool for FileSearchTool {
    fn name(&self) -> &str {
        "file_search"
    }

    fn description(&self) -> &str {
        "Search for files by name or pattern in the project directory. Supports glob patterns."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to search for (e.g., \"**/*.js\", \"*.py\", \"src/**/test*\")"
                },
                "directory": {
                    "type": "string",
                    "description": "Directory to search in (defaults to current working directory)"
                },
                "maxResults": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 50)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let pattern = str_arg(&args, "pattern")
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| CodeCliError::Tool("Missing 'pattern' argument".into()))?
            .to_string();
        let root = search_root(&args, ctx);
        let max_results = usize_arg(&args, "maxResults").unwrap_or(DEFAULT_MAX_RESULTS);

        if !ctx.permissions.check_read(&root.display().to_string()).await {
            return Ok(ToolOutput::permission_denied());
        }

        let found = tokio::task::spawn_blocking(move || glob_files(&root, &pattern))
            .await
            .map_err(|e| CodeCliError::Tool(format!("Search failed: {}", e)))?;
        let (root, files) = match found {
            Ok(found) => found,
            Err(e) => return Ok(ToolOutput::error(format!("Search failed: {}", e))),
        };

        let total = files.len();
        let matches: Vec<Value> = files
            .iter()
            .take(max_results)
            .map(|path| describe_path(&root, path))
            .collect();

        Ok(ToolOutput::ok(json!({
            "matches": matches,
            "total": total,
            "truncated": total > max_results,
        })))
    }

    fn summarize_args(&self, args: &Value) -> String {
        str_arg(args, "pattern").unwrap_or_default().to_string()
    }

    fn describe_result(&self, result: &Value) -> Option<String> {
        count_of(result, "matches").map(|n| format!("{} matches", n))
    }
}

fn glob_files(root: &Path, pattern: &str) -> std::result::Result<(PathBuf, Vec<PathBuf>), glob::PatternError> {
    let full = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        format!("{}/{}", glob::Pattern::escape(&root.to_string_lossy()), pattern)
    };

    let files = glob::glob(&full)?
        .filter_map(|entry| entry.ok())
        .filter(|path| {
            let rel = path.strip_prefix(root).unwrap_or(path);
            !rel.components().any(|c| {
                GLOB_IGNORED
                    .iter()
                    .any(|ignored| c.as_os_str() == std::ffi::OsStr::new(ignored))
            })
        })
        .collect();
    Ok((root.to_path_buf(), files))
}

fn describe_path(root: &Path, path: &Path) -> Value {
    let rel = relative_display(root, path);
    match std::fs::metadata(path) {
        Ok(meta) => {
            let mut entry = json!({
                "path": rel,
                "type": if meta.is_dir() { "directory" } else { "file" },
            });
            if meta.is_file() {
                entry["size"] = json!(meta.len());
            }
            if let Ok(modified) = meta.modified() {
                let at: chrono::DateTime<chrono::Utc> = modified.into();
                entry["modified"] = json!(at.to_rfc3339());
            }
            entry
        }
        Err(_) => json!({ "path": rel, "type": "unknown" }),
    }
}

// ============================================================================
// code_search
// ============================================================================

/// Search file contents for text or a regex, grep style.
///
/// # Parameters
/// - `query`: text or regex (required)
/// - `directory`: search root (defaults to the working directory)
/// - `include`: file name glob such as `*.rs`
/// - `isRegex`: treat `query` as a regex (default false)
/// - `caseSensitive`: default false
/// - `maxResults`: default 50
pub struct CodeSearchTool;

#[async_trait]
impl Tool for CodeSearchTool {
    fn name(&self) -> &str {
        "code_search"
    }

    fn description(&self) -> &str {
        "Search for text or regex patterns in code files. Similar to grep/ripgrep. \
         Returns matching lines with file paths and line numbers."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Text or regex pattern to search for"
                },
                "directory": {
                    "type": "string",
                    "description": "Directory to search in (defaults to cwd)"
                },
                "include": {
                    "type": "string",
                    "description": "File pattern to include (e.g., \"*.js\", \"*.py\")"
                },
                "isRegex": {
                    "type": "boolean",
                    "description": "Whether the query is a regex pattern"
                },
                "caseSensitive": {
                    "type": "boolean",
                    "description": "Whether the search is case-sensitive (default: false)"
                },
                "maxResults": {
                    "type": "integer",
                    "description": "Maximum number of results (default: 50)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let query = str_arg(&args, "query")
            .filter(|q| !q.is_empty())
            .ok_or_else(|| CodeCliError::Tool("Missing 'query' argument".into()))?;
        let root = search_root(&args, ctx);

        if !ctx.permissions.check_read(&root.display().to_string()).await {
            return Ok(ToolOutput::permission_denied());
        }

        let source = if bool_arg(&args, "isRegex").unwrap_or(false) {
            query.to_string()
        } else {
            regex::escape(query)
        };
        let regex = match RegexBuilder::new(&source)
            .case_insensitive(!bool_arg(&args, "caseSensitive").unwrap_or(false))
            .build()
        {
            Ok(re) => re,
            Err(e) => return Ok(ToolOutput::error(format!("Invalid regex: {}", e))),
        };
        let include = match str_arg(&args, "include").filter(|s| !s.trim().is_empty()) {
            Some(pattern) => match glob::Pattern::new(pattern) {
                Ok(p) => Some(p),
                Err(e) => return Ok(ToolOutput::error(format!("Invalid include pattern: {}", e))),
            },
            None => None,
        };

        let search = ContentSearch {
            regex,
            include,
            max_results: usize_arg(&args, "maxResults").unwrap_or(DEFAULT_MAX_RESULTS),
        };
        let matches = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            search.walk(&root, &root, 0, &mut matches);
            matches
        })
        .await
        .map_err(|e| CodeCliError::Tool(format!("Search failed: {}", e)))?;

        Ok(ToolOutput::ok(json!({
            "total": matches.len(),
            "matches": matches,
        })))
    }

    fn summarize_args(&self, args: &Value) -> String {
        format!("\"{}\"", str_arg(args, "query").unwrap_or_default())
    }

    fn describe_result(&self, result: &Value) -> Option<String> {
        count_of(result, "matches").map(|n| format!("{} results", n))
    }
}

struct ContentSearch {
    regex: Regex,
    include: Option<glob::Pattern>,
    max_results: usize,
}

impl ContentSearch {
    fn walk(&self, root: &Path, dir: &Path, depth: usize, out: &mut Vec<Value>) {
        if depth > MAX_SEARCH_DEPTH || out.len() >= self.max_results {
            return;
        }
        let mut entries: Vec<(String, PathBuf)> = match std::fs::read_dir(dir) {
            Ok(rd) => rd
                .filter_map(|e| e.ok())
                .map(|e| (e.file_name().to_string_lossy().into_owned(), e.path()))
                .collect(),
            Err(_) => return,
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, path) in entries {
            if out.len() >= self.max_results {
                break;
            }
            if name.starts_with('.') || name == "node_modules" {
                continue;
            }
            if path.is_dir() {
                self.walk(root, &path, depth + 1, out);
            } else if path.is_file() {
                if let Some(ref include) = self.include {
                    if !include.matches(&name) {
                        continue;
                    }
                }
                self.search_file(root, &path, out);
            }
        }
    }

    fn search_file(&self, root: &Path, path: &Path, out: &mut Vec<Value>) {
        let Ok(bytes) = std::fs::read(path) else {
            return;
        };
        if bytes[..bytes.len().min(BINARY_SNIFF_LEN)].contains(&0) {
            return;
        }
        let Ok(text) = std::str::from_utf8(&bytes) else {
            return;
        };
        let file = relative_display(root, path);
        for (i, line) in text.split('\n').enumerate() {
            if out.len() >= self.max_results {
                return;
            }
            if self.regex.is_match(line) {
                out.push(json!({
                    "file": file,
                    "line": i + 1,
                    "content": line.trim(),
                }));
            }
        }
    }
}
