//! Permission gate for file and shell operations
//!
//! Every tool that touches the filesystem or spawns a process asks the gate
//! first. A check never fails with an error: it resolves to `true` or `false`.
//!
//! Precedence, highest first:
//!
//! 1. God Mode: a target inside the bound root is allowed (every command is
//!    allowed, since commands have no path to scope)
//! 2. Auto-approve setting for the action
//! 3. Execute only: block list denies, then allow list approves
//! 4. Session cache keyed `action:target`
//! 5. Interactive prompt

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::PermissionsConfig;

use super::path::{is_within, resolve_path};
use super::shell::{CommandPolicy, CommandVerdict};

// ============================================================================
// Request / Choice
// ============================================================================

/// Kind of operation being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionAction {
    Read,
    Write,
    Execute,
}

impl PermissionAction {
    /// Name used in cache keys and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Execute => "execute",
        }
    }
}

impl std::fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single authorization question put to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub action: PermissionAction,
    /// Resolved absolute path, or the trimmed command line
    pub target: String,
}

impl PermissionRequest {
    /// Session cache key, `action:target`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.action.as_str(), self.target)
    }
}

/// Answer to a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionChoice {
    /// Allow this one request; nothing is cached
    AllowOnce,
    /// Allow and remember for the rest of the session
    AllowSession,
    /// Deny and remember for the rest of the session
    Deny,
}

/// Asks the user to decide on a request the policy could not settle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionPrompter: Send + Sync {
    async fn prompt(&self, request: &PermissionRequest) -> PermissionChoice;
}

/// Prompter for non-interactive runs: there is nobody to ask, so deny.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyPrompter;

#[async_trait]
impl PermissionPrompter for DenyPrompter {
    async fn prompt(&self, request: &PermissionRequest) -> PermissionChoice {
        debug!(key = %request.key(), "No interactive prompter, denying");
        PermissionChoice::Deny
    }
}

// ============================================================================
// Gate
// ============================================================================

#[derive(Debug, Default)]
struct GateState {
    approvals: HashSet<String>,
    denials: HashSet<String>,
    god_mode_root: Option<PathBuf>,
}

/// Decides whether read, write and execute operations may proceed.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use codecli::config::PermissionsConfig;
/// use codecli::security::{DenyPrompter, PermissionGate};
///
/// # tokio_test::block_on(async {
/// let gate = PermissionGate::new(PermissionsConfig::default(), Arc::new(DenyPrompter))
///     .with_workdir("/work/project");
/// assert!(gate.check_read("src/main.rs").await);
/// assert!(gate.check_execute("git status").await);
/// assert!(!gate.check_write("src/main.rs").await);
/// # });
/// ```
pub struct PermissionGate {
    config: PermissionsConfig,
    policy: CommandPolicy,
    prompter: Arc<dyn PermissionPrompter>,
    workdir: PathBuf,
    state: RwLock<GateState>,
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("config", &self.config)
            .field("workdir", &self.workdir)
            .field("god_mode_root", &self.god_mode_root())
            .finish()
    }
}

impl PermissionGate {
    /// Create a gate from permission settings and a prompter.
    ///
    /// Relative targets resolve against the process working directory unless
    /// [`with_workdir`](Self::with_workdir) is used.
    pub fn new(config: PermissionsConfig, prompter: Arc<dyn PermissionPrompter>) -> Self {
        let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            policy: CommandPolicy::from_config(&config),
            config,
            prompter,
            workdir,
            state: RwLock::new(GateState::default()),
        }
    }

    /// Set the base directory for relative targets.
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Base directory for relative targets.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Active permission settings.
    pub fn config(&self) -> &PermissionsConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Checks
    // ------------------------------------------------------------------------

    /// May the file or directory at `path` be read?
    pub async fn check_read(&self, path: &str) -> bool {
        let resolved = resolve_path(&self.workdir, path);
        if self.in_god_scope(&resolved) {
            debug!(path = %resolved.display(), "Read allowed by God Mode");
            return true;
        }
        if self.config.auto_approve_read {
            return true;
        }
        self.cached_or_prompt(PermissionRequest {
            action: PermissionAction::Read,
            target: resolved.display().to_string(),
        })
        .await
    }

    /// May the file at `path` be created or modified?
    pub async fn check_write(&self, path: &str) -> bool {
        let resolved = resolve_path(&self.workdir, path);
        if self.in_god_scope(&resolved) {
            debug!(path = %resolved.display(), "Write allowed by God Mode");
            return true;
        }
        if self.config.auto_approve_write {
            return true;
        }
        self.cached_or_prompt(PermissionRequest {
            action: PermissionAction::Write,
            target: resolved.display().to_string(),
        })
        .await
    }

    /// May `command` be run in a shell?
    pub async fn check_execute(&self, command: &str) -> bool {
        let command = command.trim();
        if self.is_god_mode() {
            debug!(command = %command, "Command allowed by God Mode");
            return true;
        }
        if self.config.auto_approve_execute {
            return true;
        }
        match self.policy.evaluate(command) {
            CommandVerdict::Blocked(pattern) => {
                warn!(command = %command, pattern = %pattern, "Command blocked by policy");
                return false;
            }
            CommandVerdict::Allowed(prefix) => {
                debug!(command = %command, prefix = %prefix, "Command allow-listed");
                return true;
            }
            CommandVerdict::Unknown => {}
        }
        self.cached_or_prompt(PermissionRequest {
            action: PermissionAction::Execute,
            target: command.to_string(),
        })
        .await
    }

    async fn cached_or_prompt(&self, request: PermissionRequest) -> bool {
        let key = request.key();
        {
            let state = self.read_state();
            if state.denials.contains(&key) {
                debug!(key = %key, "Denied by session cache");
                return false;
            }
            if state.approvals.contains(&key) {
                debug!(key = %key, "Allowed by session cache");
                return true;
            }
        }

        let choice = self.prompter.prompt(&request).await;
        debug!(key = %key, choice = ?choice, "Permission prompt answered");
        match choice {
            PermissionChoice::AllowOnce => true,
            PermissionChoice::AllowSession => {
                self.write_state().approvals.insert(key);
                true
            }
            PermissionChoice::Deny => {
                self.write_state().denials.insert(key);
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // God Mode / session
    // ------------------------------------------------------------------------

    /// Approve everything under `root` (and every command) until disabled.
    ///
    /// Returns the resolved root.
    pub fn enable_god_mode(&self, root: &str) -> PathBuf {
        let resolved = resolve_path(&self.workdir, root);
        info!(root = %resolved.display(), "God Mode enabled");
        self.write_state().god_mode_root = Some(resolved.clone());
        resolved
    }

    pub fn disable_god_mode(&self) {
        if self.write_state().god_mode_root.take().is_some() {
            info!("God Mode disabled");
        }
    }

    pub fn is_god_mode(&self) -> bool {
        self.read_state().god_mode_root.is_some()
    }

    pub fn god_mode_root(&self) -> Option<PathBuf> {
        self.read_state().god_mode_root.clone()
    }

    /// Forget every session approval and denial.
    pub fn reset_session(&self) {
        let mut state = self.write_state();
        state.approvals.clear();
        state.denials.clear();
    }

    /// Number of cached (approvals, denials).
    pub fn cached_decisions(&self) -> (usize, usize) {
        let state = self.read_state();
        (state.approvals.len(), state.denials.len())
    }

    fn in_god_scope(&self, path: &Path) -> bool {
        match &self.read_state().god_mode_root {
            Some(root) => is_within(root, path),
            None => false,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, GateState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, GateState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::always;

    fn strict_config() -> PermissionsConfig {
        PermissionsConfig {
            auto_approve_read: false,
            ..PermissionsConfig::default()
        }
    }

    fn gate_with(config: PermissionsConfig, prompter: MockPermissionPrompter) -> PermissionGate {
        PermissionGate::new(config, Arc::new(prompter)).with_workdir("/work/project")
    }

    fn answering(choice: PermissionChoice, times: usize) -> MockPermissionPrompter {
        let mut prompter = MockPermissionPrompter::new();
        prompter
            .expect_prompt()
            .with(always())
            .times(times)
            .return_const(choice);
        prompter
    }

    #[test]
    fn test_request_key() {
        let request = PermissionRequest {
            action: PermissionAction::Execute,
            target: "cargo test".into(),
        };
        assert_eq!(request.key(), "execute:cargo test");
    }

    #[tokio::test]
    async fn test_default_read_auto_approved() {
        let gate = gate_with(PermissionsConfig::default(), answering(PermissionChoice::Deny, 0));
        assert!(gate.check_read("anything.txt").await);
        assert!(gate.check_read("/etc/hosts").await);
    }

    #[tokio::test]
    async fn test_allow_session_is_cached() {
        let gate = gate_with(strict_config(), answering(PermissionChoice::AllowSession, 1));
        assert!(gate.check_write("/tmp/a.txt").await);
        assert!(gate.check_write("/tmp/a.txt").await);
        assert_eq!(gate.cached_decisions(), (1, 0));
    }

    #[tokio::test]
    async fn test_deny_is_cached() {
        let gate = gate_with(strict_config(), answering(PermissionChoice::Deny, 1));
        assert!(!gate.check_write("/tmp/a.txt").await);
        assert!(!gate.check_write("/tmp/a.txt").await);
        assert_eq!(gate.cached_decisions(), (0, 1));
    }

    #[tokio::test]
    async fn test_allow_once_not_cached() {
        let gate = gate_with(strict_config(), answering(PermissionChoice::AllowOnce, 2));
        assert!(gate.check_write("notes.md").await);
        assert!(gate.check_write("notes.md").await);
        assert_eq!(gate.cached_decisions(), (0, 0));
    }

    #[tokio::test]
    async fn test_cache_keys_resolve_relative_paths() {
        let gate = gate_with(strict_config(), answering(PermissionChoice::AllowSession, 1));
        assert!(gate.check_write("src/lib.rs").await);
        // Same file through a different spelling hits the cache
        assert!(gate.check_write("/work/project/src/../src/lib.rs").await);
    }

    #[tokio::test]
    async fn test_cache_is_per_action() {
        let gate = gate_with(strict_config(), answering(PermissionChoice::AllowSession, 2));
        assert!(gate.check_write("/tmp/a.txt").await);
        assert!(gate.check_read("/tmp/a.txt").await);
        assert_eq!(gate.cached_decisions(), (2, 0));
    }

    #[tokio::test]
    async fn test_execute_allow_list_and_block_list() {
        let gate = gate_with(PermissionsConfig::default(), answering(PermissionChoice::AllowSession, 0));
        assert!(gate.check_execute("ls -la").await);
        assert!(gate.check_execute("git diff HEAD~1").await);
        assert!(!gate.check_execute("rm -rf /").await);
        assert!(!gate.check_execute("echo x; rm -rf /").await);
    }

    #[tokio::test]
    async fn test_execute_unknown_prompts_and_caches() {
        let gate = gate_with(PermissionsConfig::default(), answering(PermissionChoice::AllowSession, 1));
        assert!(gate.check_execute("cargo build").await);
        assert!(gate.check_execute("  cargo build ").await);
    }

    #[tokio::test]
    async fn test_auto_approve_execute_skips_lists() {
        let config = PermissionsConfig {
            auto_approve_execute: true,
            ..PermissionsConfig::default()
        };
        let gate = gate_with(config, answering(PermissionChoice::Deny, 0));
        assert!(gate.check_execute("make install").await);
    }

    #[tokio::test]
    async fn test_god_mode_scope() {
        let gate = gate_with(strict_config(), answering(PermissionChoice::Deny, 1));
        let root = gate.enable_god_mode("/work/project");
        assert_eq!(root, PathBuf::from("/work/project"));
        assert!(gate.is_god_mode());

        assert!(gate.check_write("src/main.rs").await);
        assert!(gate.check_read("/work/project").await);
        assert!(gate.check_execute("rm -rf build").await);
        // Sibling with a shared string prefix is out of scope and prompts
        assert!(!gate.check_write("/work/project2/x").await);
    }

    #[tokio::test]
    async fn test_god_mode_bypasses_cached_denial() {
        let gate = gate_with(strict_config(), answering(PermissionChoice::Deny, 1));
        assert!(!gate.check_write("a.txt").await);
        gate.enable_god_mode(".");
        assert!(gate.check_write("a.txt").await);
        gate.disable_god_mode();
        assert!(!gate.is_god_mode());
        assert!(!gate.check_write("a.txt").await);
    }

    #[tokio::test]
    async fn test_reset_session_clears_cache() {
        let gate = gate_with(strict_config(), answering(PermissionChoice::AllowSession, 2));
        assert!(gate.check_write("a.txt").await);
        gate.reset_session();
        assert_eq!(gate.cached_decisions(), (0, 0));
        assert!(gate.check_write("a.txt").await);
    }

    #[tokio::test]
    async fn test_deny_prompter() {
        let gate = PermissionGate::new(strict_config(), Arc::new(DenyPrompter));
        assert!(!gate.check_write("a.txt").await);
        assert!(!gate.check_execute("cargo run").await);
    }
}
