//! Slash commands available at the interactive prompt.

use anyhow::Result;

use codecli::agent::{AgentLoop, MIN_MANUAL_COMPACT_MESSAGES};
use codecli::session::Checkpoint;
use codecli::utils::tokens::format_token_count;

/// A parsed `/command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SlashCommand {
    /// `/god [on|off]`; `None` toggles
    God(Option<bool>),
    Compact,
    /// `/rewind [id|label]`; `None` rewinds to the latest checkpoint
    Rewind(Option<String>),
    Checkpoint(Option<String>),
    Checkpoints,
    Usage,
    Clear,
    Help,
    Unknown(String),
}

const HELP: &str = "\
  /god [on|off]          Toggle God Mode for the working directory
  /compact               Summarize older messages to free context
  /checkpoint [label]    Record a checkpoint
  /checkpoints           List checkpoints
  /rewind [id|label]     Rewind to a checkpoint (latest by default)
  /usage                 Show context and token usage
  /clear                 Clear the conversation
  /help                  Show this help
  exit, quit             Leave";

/// Parse a line starting with `/`. Returns `None` for ordinary input.
pub(crate) fn parse(line: &str) -> Option<SlashCommand> {
    let rest = line.trim().strip_prefix('/')?;
    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default().to_ascii_lowercase();
    let arg = {
        let joined = words.collect::<Vec<_>>().join(" ");
        (!joined.is_empty()).then_some(joined)
    };

    let command = match name.as_str() {
        "god" => match arg.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("on") => SlashCommand::God(Some(true)),
            Some("off") => SlashCommand::God(Some(false)),
            _ => SlashCommand::God(None),
        },
        "compact" => SlashCommand::Compact,
        "rewind" => SlashCommand::Rewind(arg),
        "checkpoint" => SlashCommand::Checkpoint(arg),
        "checkpoints" => SlashCommand::Checkpoints,
        "usage" | "cost" => SlashCommand::Usage,
        "clear" => SlashCommand::Clear,
        "help" | "?" => SlashCommand::Help,
        other => SlashCommand::Unknown(other.to_string()),
    };
    Some(command)
}

/// Run a command and return the text to show.
pub(crate) async fn execute(command: SlashCommand, agent: &AgentLoop) -> Result<String> {
    let permissions = &agent.runtime().permissions;

    let output = match command {
        SlashCommand::God(target) => {
            let enable = target.unwrap_or(!permissions.is_god_mode());
            if enable {
                let root = permissions.enable_god_mode(".");
                format!(
                    "  GOD MODE ENABLED for {}\n  All operations inside this directory are auto-approved.",
                    root.display()
                )
            } else {
                permissions.disable_god_mode();
                "  GOD MODE DISABLED\n  Permissions will be requested for all operations.".to_string()
            }
        }
        SlashCommand::Compact => {
            let count = agent.session().message_count().await;
            if count < MIN_MANUAL_COMPACT_MESSAGES {
                "  Conversation is too short to compact.".to_string()
            } else {
                match agent.manual_compact().await? {
                    Some(report) => format!(
                        "  Compacted: {} -> {} messages",
                        report.before, report.after
                    ),
                    None => "  Nothing to compact.".to_string(),
                }
            }
        }
        SlashCommand::Checkpoint(label) => {
            let cp = agent.create_checkpoint(label.as_deref()).await;
            format!(
                "  Checkpoint {} ({}) at {} messages",
                cp.label,
                short_id(&cp.id),
                cp.message_index
            )
        }
        SlashCommand::Checkpoints => {
            let checkpoints = agent.checkpoints().await;
            if checkpoints.is_empty() {
                "  No checkpoints available.".to_string()
            } else {
                checkpoints
                    .iter()
                    .rev()
                    .map(|cp| {
                        format!(
                            "  {}  {}  {} messages  {}",
                            short_id(&cp.id),
                            cp.label,
                            cp.message_index,
                            cp.timestamp.format("%Y-%m-%d %H:%M:%S")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        SlashCommand::Rewind(target) => {
            let checkpoints = agent.checkpoints().await;
            match find_checkpoint(&checkpoints, target.as_deref()) {
                None if checkpoints.is_empty() => "  No checkpoints available.\n  Checkpoints are created automatically during the conversation.".to_string(),
                None => format!(
                    "  Checkpoint not found: {}",
                    target.unwrap_or_default()
                ),
                Some(cp) => {
                    agent.rewind(&cp.id).await;
                    format!(
                        "  Rewound to {}. {} messages remaining.",
                        cp.label,
                        agent.session().message_count().await
                    )
                }
            }
        }
        SlashCommand::Usage => {
            let context = agent.estimate_usage().await;
            let tokens = agent.runtime().usage();
            format!(
                "  Context: {} / {} tokens ({:.1}%)\n  Session: {} prompt + {} completion = {} tokens",
                format_token_count(context.used as u64),
                format_token_count(context.max as u64),
                context.percentage,
                format_token_count(tokens.prompt_tokens),
                format_token_count(tokens.completion_tokens),
                format_token_count(tokens.total_tokens)
            )
        }
        SlashCommand::Clear => {
            agent.session().clear_messages().await;
            "  Conversation cleared.".to_string()
        }
        SlashCommand::Help => HELP.to_string(),
        SlashCommand::Unknown(name) => {
            format!("  Unknown command: /{}. Type /help for commands.", name)
        }
    };
    Ok(output)
}

/// Match by exact id, label, or id prefix; the latest checkpoint when no
/// target is given.
fn find_checkpoint(checkpoints: &[Checkpoint], target: Option<&str>) -> Option<Checkpoint> {
    let Some(target) = target else {
        return checkpoints.last().cloned();
    };
    checkpoints
        .iter()
        .rev()
        .find(|cp| cp.id == target || cp.label == target)
        .or_else(|| checkpoints.iter().rev().find(|cp| cp.id.starts_with(target)))
        .cloned()
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
