//! Interactive agent mode (REPL).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::error;

use codecli::agent::{CompactionReport, TurnObserver};
use codecli::config::Config;
use codecli::error::CodeCliError;
use codecli::providers::format_context_window;
use codecli::session::Message;
use codecli::tools::ToolResult;

use super::commands;
use super::common::{build_app, friendly_error, user_message, App, SessionOrigin};
use super::prompt::TerminalPrompter;
use super::Cli;

/// Renders a running turn on the terminal: answer text on stdout, tool
/// progress and warnings on stderr.
#[derive(Debug, Default)]
pub(crate) struct TerminalObserver {
    /// Text was printed since the last newline
    mid_line: AtomicBool,
}

impl TerminalObserver {
    fn end_line(&self) {
        if self.mid_line.swap(false, Ordering::Relaxed) {
            println!();
        }
    }
}

impl TurnObserver for TerminalObserver {
    fn on_text(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        print!("{}", text);
        let _ = io::stdout().flush();
        self.mid_line
            .store(!text.ends_with('\n'), Ordering::Relaxed);
    }

    fn on_thought(&self, text: &str) {
        eprint!("{}", text);
    }

    fn on_tool_start(&self, name: &str, summary: &str) {
        self.end_line();
        eprintln!("  * {}({})", name, summary);
    }

    fn on_tool_result(&self, result: &ToolResult) {
        let detail = result.detail.as_deref().unwrap_or("done");
        if result.is_error {
            eprintln!("    x {} ({}ms)", detail, result.duration_ms);
        } else {
            eprintln!("    - {} ({}ms)", detail, result.duration_ms);
        }
    }

    fn on_compaction(&self, report: &CompactionReport) {
        self.end_line();
        eprintln!(
            "  Context compacted: {} -> {} messages",
            report.before, report.after
        );
    }

    fn on_warning(&self, message: &str) {
        self.end_line();
        eprintln!("  Warning: {}", message);
    }
}

/// Start the REPL, running `cli.prompt` (with any images) as the first turn.
pub(crate) async fn cmd_interactive(cli: Cli, config: Config, cwd: PathBuf) -> Result<()> {
    let app = build_app(
        &cli,
        config,
        cwd.clone(),
        Arc::new(TerminalPrompter),
        true,
        true,
    )
    .await?;

    print_banner(&app).await;

    if let Some(ref prompt) = cli.prompt {
        let message = user_message(prompt, &cli.images, &cwd)?;
        run_turn(&app, message).await;
    } else if !cli.images.is_empty() {
        eprintln!("  Images are attached to the initial prompt; none was given.");
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        let read = stdin
            .lock()
            .read_line(&mut input)
            .context("Error reading input")?;
        if read == 0 {
            // EOF
            println!();
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            println!("Goodbye!");
            break;
        }

        if let Some(command) = commands::parse(input) {
            match commands::execute(command, &app.agent).await {
                Ok(output) => println!("{}", output),
                Err(e) => match e.downcast_ref::<CodeCliError>() {
                    Some(err) => eprintln!("  Error: {}", friendly_error(app.provider_kind, err)),
                    None => eprintln!("  Error: {:#}", e),
                },
            }
            continue;
        }

        run_turn(&app, Message::user(input)).await;
    }

    Ok(())
}

/// One turn. Failures are shown inline; the REPL keeps running.
async fn run_turn(app: &App, message: Message) {
    let observer = TerminalObserver::default();
    println!();
    match app.agent.process_message(message, &observer).await {
        Ok(outcome) => {
            observer.end_line();
            if outcome.content.is_empty() && !outcome.hit_iteration_cap {
                println!("(no response)");
            }
        }
        Err(e) => {
            observer.end_line();
            error!(error = %e, "Turn failed");
            eprintln!("  Error: {}", friendly_error(app.provider_kind, &e));
        }
    }
    println!();
}

async fn print_banner(app: &App) {
    let provider = app.agent.provider();
    println!("CodeCLI v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Provider: {} ({}, {} context)",
        app.provider_kind,
        provider.model(),
        format_context_window(provider.context_window())
    );
    println!("  Directory: {}", app.ctx.workdir.display());
    if let Some(root) = app.ctx.permissions.god_mode_root() {
        println!("  GOD MODE: all operations inside {} are auto-approved", root.display());
    }
    match app.origin {
        SessionOrigin::New => {}
        SessionOrigin::Resumed | SessionOrigin::AutoResumed => {
            let count = app.agent.session().message_count().await;
            let id = app.agent.session_id().await.unwrap_or_default();
            println!(
                "  Resumed session {} ({} messages)",
                id.get(..8).unwrap_or(&id),
                count
            );
        }
    }
    println!("Type your message and press Enter. /help for commands, 'exit' to quit.");
    println!();
}
