//! Shell command policy
//!
//! Classifies a command line against the configured allow and block lists
//! before the permission gate decides whether to prompt.

use crate::config::PermissionsConfig;

/// Outcome of matching a command line against the policy lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandVerdict {
    /// Starts with an allow-listed command
    Allowed(String),
    /// Contains a block-listed pattern
    Blocked(String),
    /// Neither list matched
    Unknown,
}

/// Allow/block lists for shell commands.
///
/// Blocked patterns are matched case-insensitively anywhere in the command.
/// Allowed entries must match a prefix that ends at a word boundary, so
/// `ls` approves `ls -la` but not `lsblk`. The block list wins when both
/// match.
#[derive(Debug, Clone, Default)]
pub struct CommandPolicy {
    allowed: Vec<String>,
    blocked: Vec<String>,
}

impl CommandPolicy {
    /// Build a policy from explicit lists. Blank entries are ignored.
    pub fn new(allowed: Vec<String>, blocked: Vec<String>) -> Self {
        let clean = |list: Vec<String>| -> Vec<String> {
            list.into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            allowed: clean(allowed),
            blocked: clean(blocked),
        }
    }

    /// Build a policy from the permission settings.
    pub fn from_config(config: &PermissionsConfig) -> Self {
        Self::new(
            config.allowed_commands.clone(),
            config.blocked_commands.clone(),
        )
    }

    /// Classify `command`.
    ///
    /// # Example
    /// ```
    /// use codecli::security::{CommandPolicy, CommandVerdict};
    ///
    /// let policy = CommandPolicy::new(vec!["ls".into()], vec!["rm -rf /".into()]);
    /// assert_eq!(policy.evaluate("ls -la"), CommandVerdict::Allowed("ls".into()));
    /// assert_eq!(policy.evaluate("lsblk"), CommandVerdict::Unknown);
    /// ```
    pub fn evaluate(&self, command: &str) -> CommandVerdict {
        let command = command.trim();
        let lowered = command.to_lowercase();

        if let Some(pattern) = self
            .blocked
            .iter()
            .find(|p| lowered.contains(&p.to_lowercase()))
        {
            return CommandVerdict::Blocked(pattern.clone());
        }

        if let Some(prefix) = self
            .allowed
            .iter()
            .find(|p| starts_with_word(command, p))
        {
            return CommandVerdict::Allowed(prefix.clone());
        }

        CommandVerdict::Unknown
    }

    /// Allow-listed command prefixes.
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Block-listed patterns.
    pub fn blocked(&self) -> &[String] {
        &self.blocked
    }
}

fn starts_with_word(command: &str, prefix: &str) -> bool {
    match command.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(char::is_whitespace),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_policy() -> CommandPolicy {
        CommandPolicy::from_config(&PermissionsConfig::default())
    }

    #[test]
    fn test_allowed_prefix() {
        let policy = default_policy();
        assert_eq!(policy.evaluate("ls"), CommandVerdict::Allowed("ls".into()));
        assert_eq!(
            policy.evaluate("git status --short"),
            CommandVerdict::Allowed("git status".into())
        );
        assert_eq!(policy.evaluate("  pwd  "), CommandVerdict::Allowed("pwd".into()));
    }

    #[test]
    fn test_allowed_requires_word_boundary() {
        let policy = default_policy();
        assert_eq!(policy.evaluate("lsblk"), CommandVerdict::Unknown);
        assert_eq!(policy.evaluate("catastrophe.sh"), CommandVerdict::Unknown);
        assert_eq!(policy.evaluate("git statusx"), CommandVerdict::Unknown);
    }

    #[test]
    fn test_blocked_substring_case_insensitive() {
        let policy = default_policy();
        assert_eq!(
            policy.evaluate("sudo RM -RF / --no-preserve-root"),
            CommandVerdict::Blocked("rm -rf /".into())
        );
        assert_eq!(
            policy.evaluate("format c:"),
            CommandVerdict::Blocked("format".into())
        );
    }

    #[test]
    fn test_blocked_wins_over_allowed() {
        let policy = default_policy();
        // Starts with allow-listed "echo" but contains a blocked pattern.
        assert_eq!(
            policy.evaluate("echo hi && rm -rf /"),
            CommandVerdict::Blocked("rm -rf /".into())
        );
    }

    #[test]
    fn test_unknown_command() {
        let policy = default_policy();
        assert_eq!(policy.evaluate("cargo build"), CommandVerdict::Unknown);
        assert_eq!(policy.evaluate(""), CommandVerdict::Unknown);
    }

    #[test]
    fn test_blank_entries_ignored() {
        let policy = CommandPolicy::new(vec!["".into(), "  ".into()], vec![" ".into()]);
        assert!(policy.allowed().is_empty());
        assert!(policy.blocked().is_empty());
        assert_eq!(policy.evaluate("anything"), CommandVerdict::Unknown);
    }
}
