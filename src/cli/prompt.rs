//! Interactive permission prompt on the terminal.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tracing::warn;

use codecli::security::{PermissionChoice, PermissionPrompter, PermissionRequest};

/// Asks the user at the terminal. The question goes to stderr so piped
/// stdout stays clean; the answer is read from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TerminalPrompter;

#[async_trait]
impl PermissionPrompter for TerminalPrompter {
    async fn prompt(&self, request: &PermissionRequest) -> PermissionChoice {
        let question = format!(
            "\n  Permission required: {} {}\n  [y] Yes (this time)  [a] Yes (for this session)  [n] No\n  > ",
            request.action, request.target
        );

        let answer = tokio::task::spawn_blocking(move || ask(&question)).await;
        match answer {
            Ok(Ok(line)) => parse_choice(&line).unwrap_or(PermissionChoice::Deny),
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read permission answer, denying");
                PermissionChoice::Deny
            }
            Err(e) => {
                warn!(error = %e, "Permission prompt task failed, denying");
                PermissionChoice::Deny
            }
        }
    }
}

fn ask(question: &str) -> io::Result<String> {
    let mut stderr = io::stderr();
    stderr.write_all(question.as_bytes())?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// Map an answer to a choice. Anything unrecognised is `None` (denied).
pub(crate) fn parse_choice(answer: &str) -> Option<PermissionChoice> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "once" => Some(PermissionChoice::AllowOnce),
        "a" | "always" | "session" => Some(PermissionChoice::AllowSession),
        "n" | "no" | "deny" => Some(PermissionChoice::Deny),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("y\n"), Some(PermissionChoice::AllowOnce));
        assert_eq!(parse_choice(" Always "), Some(PermissionChoice::AllowSession));
        assert_eq!(parse_choice("a"), Some(PermissionChoice::AllowSession));
        assert_eq!(parse_choice("NO"), Some(PermissionChoice::Deny));
        assert_eq!(parse_choice(""), None);
        assert_eq!(parse_choice("maybe"), None);
    }
}
