//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod agent;
pub mod commands;
pub mod common;
pub mod config;
pub mod headless;
pub mod prompt;
pub mod sessions;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use codecli::config::Config;

#[derive(Parser, Debug)]
#[command(name = "codecli")]
#[command(version)]
#[command(
    about = "AI-powered coding assistant for the terminal (Azure OpenAI, Ollama, Gemini)",
    long_about = None
)]
pub(crate) struct Cli {
    /// Initial prompt to start with
    pub prompt: Option<String>,

    /// Continue the most recent conversation
    #[arg(short = 'c', long = "continue")]
    pub continue_session: bool,

    /// Resume a specific session by id (or id prefix)
    #[arg(short, long, value_name = "SESSION_ID")]
    pub resume: Option<String>,

    /// Model to use
    #[arg(short, long)]
    pub model: Option<String>,

    /// Provider to use (azure-openai, ollama, gemini)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Custom instructions added to the system prompt
    #[arg(long, value_name = "PROMPT")]
    pub system_prompt: Option<String>,

    /// Load custom instructions from a file
    #[arg(long, value_name = "FILE", conflicts_with = "system_prompt")]
    pub system_prompt_file: Option<PathBuf>,

    /// Text appended to the end of the system prompt
    #[arg(long, value_name = "PROMPT")]
    pub append_system_prompt: Option<String>,

    /// Output format for headless mode
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,

    /// Run a single prompt without the interactive prompt
    #[arg(long)]
    pub headless: bool,

    /// Auto-approve every operation inside the working directory
    #[arg(long)]
    pub god_mode: bool,

    /// Enable debug logging
    #[arg(long)]
    pub verbose: bool,

    /// Attach an image to the initial prompt (repeatable)
    #[arg(long = "image", value_name = "PATH")]
    pub images: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// List saved sessions
    Sessions {
        /// Maximum number of sessions to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Print the effective configuration
    List,
    /// Print one value by dotted key (e.g. permissions.autoApproveWrite)
    Get { key: String },
    /// Set a value in the project config (or the global one with --global)
    Set {
        key: String,
        /// JSON value; anything that does not parse as JSON is stored as a string
        value: String,
        #[arg(long)]
        global: bool,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

pub async fn run() -> Result<()> {
    let mut cli = Cli::parse();
    let cwd = std::env::current_dir().context("Failed to determine the working directory")?;

    // Load config early so logging respects it; a broken config file is
    // reported after logging is up.
    let loaded = Config::load(&cwd);
    let mut logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    codecli::utils::logging::init_logging(&logging);

    let config = loaded.with_context(|| {
        format!(
            "Failed to load configuration ({} / {})",
            Config::path().display(),
            Config::project_path(&cwd).display()
        )
    })?;

    match cli.command.take() {
        Some(Commands::Config { action }) => {
            config::cmd_config(action.unwrap_or(ConfigAction::List), &config, &cwd)?;
        }
        Some(Commands::Sessions { limit }) => {
            sessions::cmd_sessions(limit).await?;
        }
        None if cli.headless => {
            headless::cmd_headless(cli, config, cwd).await?;
        }
        None => {
            agent::cmd_interactive(cli, config, cwd).await?;
        }
    }

    Ok(())
}
