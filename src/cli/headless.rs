//! Headless mode: run one prompt to completion and print the result.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use codecli::agent::{NullObserver, TurnOutcome};
use codecli::config::Config;
use codecli::providers::Usage;
use codecli::security::DenyPrompter;

use super::common::{build_app, friendly_error, user_message};
use super::{Cli, OutputFormat};

/// JSON envelope printed with `--output-format json`.
#[derive(Debug, Serialize)]
pub(crate) struct HeadlessReply {
    pub content: String,
    pub usage: Option<Usage>,
    pub session: Option<String>,
}

/// Run the prompt without any interaction. Operations that would need a
/// permission prompt are denied.
pub(crate) async fn cmd_headless(cli: Cli, config: Config, cwd: PathBuf) -> Result<()> {
    let prompt = match cli.prompt.clone() {
        Some(p) if !p.trim().is_empty() => p,
        _ => read_piped_prompt()?,
    };

    let app = build_app(&cli, config, cwd.clone(), Arc::new(DenyPrompter), false, false).await?;
    let message = user_message(&prompt, &cli.images, &cwd)?;

    let outcome = app
        .agent
        .process_message(message, &NullObserver)
        .await
        .map_err(|e| anyhow::anyhow!(friendly_error(app.provider_kind, &e)))?;

    let session = app.agent.session_id().await;
    println!("{}", render(&outcome, session, cli.output_format)?);
    Ok(())
}

fn render(outcome: &TurnOutcome, session: Option<String>, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(outcome.content.clone()),
        OutputFormat::Json => {
            let reply = HeadlessReply {
                content: outcome.content.clone(),
                usage: outcome.usage,
                session,
            };
            Ok(serde_json::to_string(&reply)?)
        }
    }
}

/// With no positional prompt, take the prompt from piped stdin.
fn read_piped_prompt() -> Result<String> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        bail!("Headless mode needs a prompt (argument or piped stdin)");
    }
    let mut input = String::new();
    stdin
        .lock()
        .read_to_string(&mut input)
        .context("Failed to read prompt from stdin")?;
    if input.trim().is_empty() {
        bail!("Headless mode needs a prompt (argument or piped stdin)");
    }
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome() -> TurnOutcome {
        TurnOutcome {
            content: "All tests pass.".to_string(),
            iterations: 2,
            hit_iteration_cap: false,
            usage: Some(Usage::new(120, 30)),
        }
    }

    #[test]
    fn test_render_text() {
        let text = render(&outcome(), Some("abc".into()), OutputFormat::Text).unwrap();
        assert_eq!(text, "All tests pass.");
    }

    #[test]
    fn test_render_json_envelope() {
        let json = render(&outcome(), Some("abc".into()), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["content"], "All tests pass.");
        assert_eq!(value["session"], "abc");
        assert_eq!(value["usage"]["promptTokens"], 120);
        assert_eq!(value["usage"]["totalTokens"], 150);
    }

    #[test]
    fn test_render_json_without_usage() {
        let mut o = outcome();
        o.usage = None;
        let json = render(&o, None, OutputFormat::Json).unwrap();
        assert_eq!(
            json,
            r#"{"content":"All tests pass.","usage":null,"session":null}"#
        );
    }
}
