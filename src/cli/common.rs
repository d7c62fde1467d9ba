//! Shared CLI helpers used across the interactive and headless modes.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::Engine;
use tracing::{debug, info};

use codecli::agent::{AgentLoop, AgentSettings, RuntimeContext, SystemPromptBuilder};
use codecli::config::Config;
use codecli::error::CodeCliError;
use codecli::providers::{create_provider, ProviderKind};
use codecli::security::PermissionPrompter;
use codecli::session::{ContentPart, Message, SessionStore};
use codecli::tools::ToolRegistry;

use super::Cli;

/// How the session for this run was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionOrigin {
    New,
    /// `--resume` or `--continue`
    Resumed,
    /// Picked up from the working directory's pointer file
    AutoResumed,
}

/// Everything a run needs, wired together.
pub(crate) struct App {
    pub agent: AgentLoop,
    pub ctx: Arc<RuntimeContext>,
    pub provider_kind: ProviderKind,
    pub origin: SessionOrigin,
}

/// Build the agent for this invocation.
///
/// Resolves the provider, creates the runtime context, enables God Mode
/// when asked, and loads or creates the session. `auto_resume` allows a
/// silent resume from the local pointer file.
pub(crate) async fn build_app(
    cli: &Cli,
    config: Config,
    cwd: PathBuf,
    prompter: Arc<dyn PermissionPrompter>,
    interactive: bool,
    auto_resume: bool,
) -> Result<App> {
    let provider_name = cli
        .provider
        .clone()
        .unwrap_or_else(|| config.default_provider.clone());
    let provider_kind = ProviderKind::from_str(&provider_name)?;
    let provider = create_provider(provider_kind, &config, cli.model.as_deref())?;
    info!(provider = %provider_kind, model = provider.model(), "Provider ready");

    let system_prompt = build_system_prompt(cli, &cwd)?;
    let settings = AgentSettings::from_config(&config, system_prompt);

    let ctx = Arc::new(
        RuntimeContext::new(config, cwd.clone(), prompter).with_interactive(interactive),
    );
    if cli.god_mode {
        ctx.permissions.enable_god_mode(".");
    }

    let session = SessionStore::new(SessionStore::default_dir(), cwd);
    let origin = open_session(cli, &session, provider_kind, auto_resume).await?;

    let agent = AgentLoop::new(
        provider,
        ToolRegistry::with_builtins(),
        session,
        Arc::clone(&ctx),
        settings,
    );

    Ok(App {
        agent,
        ctx,
        provider_kind,
        origin,
    })
}

/// Explicit resume requests fail hard; auto-resume failures are silent.
async fn open_session(
    cli: &Cli,
    session: &SessionStore,
    provider: ProviderKind,
    auto_resume: bool,
) -> Result<SessionOrigin> {
    if let Some(ref id) = cli.resume {
        session.load(id).await.map_err(|e| match e {
            CodeCliError::SessionNotFound(_) => anyhow::anyhow!("Session not found: {}", id),
            other => anyhow::Error::new(other).context(format!("Failed to load session {}", id)),
        })?;
        return Ok(SessionOrigin::Resumed);
    }

    if cli.continue_session {
        if session.load_latest().await?.is_none() {
            bail!("No previous session found");
        }
        return Ok(SessionOrigin::Resumed);
    }

    if auto_resume && session.load_local().await.is_some() {
        return Ok(SessionOrigin::AutoResumed);
    }

    let info = session.create(provider.as_str()).await;
    debug!(session_id = %info.id, "Started new session");
    Ok(SessionOrigin::New)
}

/// Assemble the system prompt from project memory and the CLI overrides.
pub(crate) fn build_system_prompt(cli: &Cli, cwd: &Path) -> Result<String> {
    let custom = match (&cli.system_prompt, &cli.system_prompt_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => {
            let path = cwd.join(path);
            std::fs::read_to_string(&path)
                .with_context(|| format!("System prompt file not found: {}", path.display()))?
        }
        (None, None) => String::new(),
    };

    let builder = SystemPromptBuilder::new(cwd)
        .with_project_files(&Config::dir())
        .with_custom_instructions(&custom)
        .with_append(cli.append_system_prompt.as_deref().unwrap_or_default());
    Ok(builder.build())
}

/// Build the user message for `prompt`, attaching `images` as inline
/// base64 data URLs.
pub(crate) fn user_message(prompt: &str, images: &[PathBuf], cwd: &Path) -> Result<Message> {
    if images.is_empty() {
        return Ok(Message::user(prompt));
    }

    let mut parts = vec![ContentPart::text(prompt)];
    for image in images {
        let path = cwd.join(image);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Image not found: {}", path.display()))?;
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        parts.push(ContentPart::image_base64(image_mime_type(&path), &data));
    }
    Ok(Message::user_with_parts(parts))
}

/// MIME type by file extension, `image/png` when unknown.
pub(crate) fn image_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

/// Map a provider failure to a message with actionable guidance.
pub(crate) fn friendly_error(provider: ProviderKind, error: &CodeCliError) -> String {
    let CodeCliError::Provider(provider_error) = error else {
        return error.to_string();
    };
    let Some(status) = provider_error.status_code() else {
        return format!(
            "Could not reach {}: {}",
            provider,
            provider_error
        );
    };

    // Try to extract a message from the provider's JSON error response.
    let api_msg = provider_error
        .body()
        .and_then(|body| serde_json::from_str::<serde_json::Value>(body).ok())
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });

    let base = match status {
        401 | 403 => format!(
            "Invalid API key. Check your {} credentials and try again.",
            provider
        ),
        402 => format!("Billing issue on your {} account.", provider),
        404 => "Model not found. Check the model or deployment name.".to_string(),
        429 => "Rate limited. Wait a moment and try again.".to_string(),
        _ => format!("{} returned HTTP {}.", provider, status),
    };

    match api_msg {
        Some(msg) => format!("{}\n  Detail: {}", base, msg),
        None => base,
    }
}
