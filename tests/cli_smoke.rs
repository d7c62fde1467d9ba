//! CLI smoke tests for the commands that work without a model backend.
//!
//! Each test runs the compiled binary with HOME pointed at a fresh temp
//! directory, so nothing touches the real `~/.codecli`.

use std::path::Path;
use std::process::{Command, Stdio};

use tempfile::tempdir;

/// Run codecli in `dir` with HOME set to `dir`; returns (exit_code, stdout, stderr).
fn run_cli(dir: &Path, args: &[&str]) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_codecli");
    let output = Command::new(bin)
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env("USERPROFILE", dir)
        .env("RUST_LOG", "error")
        .env_remove("CODECLI_AGENT_MAX_ITERATIONS")
        .stdin(Stdio::null())
        .output()
        .expect("failed to execute codecli binary");
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

// ============================================================================
// Help & Version
// ============================================================================

#[test]
fn cli_help() {
    let dir = tempdir().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("--headless"));
    assert!(stdout.contains("--god-mode"));
    assert!(stdout.contains("sessions"));
}

#[test]
fn cli_version() {
    let dir = tempdir().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["--version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cli_rejects_conflicting_system_prompts() {
    let dir = tempdir().unwrap();
    let (code, _, stderr) = run_cli(
        dir.path(),
        &["--system-prompt", "a", "--system-prompt-file", "b.txt"],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("cannot be used with"));
}

// ============================================================================
// Sessions
// ============================================================================

#[test]
fn cli_sessions_empty() {
    let dir = tempdir().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["sessions"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("No saved sessions."));
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn cli_config_get_default() {
    let dir = tempdir().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["config", "get", "agent.maxIterations"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "25");
}

#[test]
fn cli_config_list_is_json() {
    let dir = tempdir().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["config", "list"]);
    assert_eq!(code, 0);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["compaction"]["keepRecent"], 4);
}

#[test]
fn cli_config_set_project_then_get() {
    let dir = tempdir().unwrap();
    let (code, _, stderr) = run_cli(dir.path(), &["config", "set", "maxTokens", "2048"]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(dir.path().join(".codecli.json").exists());

    let (code, stdout, _) = run_cli(dir.path(), &["config", "get", "maxTokens"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "2048");
}

#[test]
fn cli_config_get_unknown_key_fails() {
    let dir = tempdir().unwrap();
    let (code, _, stderr) = run_cli(dir.path(), &["config", "get", "noSuchKey"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Unknown config key"));
}

// ============================================================================
// Headless
// ============================================================================

#[test]
fn cli_headless_without_prompt_fails() {
    let dir = tempdir().unwrap();
    let (code, _, stderr) = run_cli(dir.path(), &["--headless"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Headless mode needs a prompt"));
}
