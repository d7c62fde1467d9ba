//! On-disk session layout and discovery.
//!
//! Every session is one JSON document named `{id}.json` inside the sessions
//! directory, holding `{session, messages, checkpoints}`. The working
//! directory additionally carries a small pointer file used to resume the
//! last conversation automatically.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CodeCliError, Result};
use crate::session::{Checkpoint, Message, Role, SessionInfo};

/// Name of the pointer file written into the working directory on save.
pub const POINTER_FILE: &str = ".codecli_session.json";

/// Full persisted state of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    pub session: SessionInfo,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}

/// Local auto-resume pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPointer {
    pub session_id: String,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry for a stored session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub cwd: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of stored messages
    pub message_count: usize,
    /// First user message, truncated to 60 chars
    pub title: String,
}

impl SessionFile {
    /// Path of the document for `id` inside `dir`.
    pub fn path_for(dir: &Path, id: &str) -> PathBuf {
        dir.join(format!("{}.json", id))
    }

    /// Read and parse one session document.
    pub async fn read(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write this document into `dir`, creating the directory if needed.
    pub async fn write(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = Self::path_for(dir, &self.session.id);
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.session.id.clone(),
            name: self.session.name.clone(),
            provider: self.session.provider.clone(),
            cwd: self.session.cwd.clone(),
            created_at: self.session.created_at,
            updated_at: self.session.updated_at,
            message_count: self.messages.len(),
            title: extract_title(&self.messages),
        }
    }
}

impl SessionPointer {
    /// Write the pointer file into `workdir`.
    pub async fn write(&self, workdir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(workdir.join(POINTER_FILE), content).await?;
        Ok(())
    }

    /// Read the pointer file from `workdir`, if present and well-formed.
    pub async fn read(workdir: &Path) -> Option<Self> {
        let content = tokio::fs::read_to_string(workdir.join(POINTER_FILE))
            .await
            .ok()?;
        serde_json::from_str(&content).ok()
    }
}

/// Read every parseable session document in `dir`.
///
/// A missing directory yields an empty list; unreadable or malformed files
/// are skipped.
async fn read_all(dir: &Path) -> Result<Vec<SessionFile>> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }
        match SessionFile::read(&path).await {
            Ok(file) => files.push(file),
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "Skipping session file"),
        }
    }

    Ok(files)
}

/// List stored sessions, most recently updated first.
pub async fn list_sessions(dir: &Path) -> Result<Vec<SessionSummary>> {
    let mut summaries: Vec<SessionSummary> =
        read_all(dir).await?.iter().map(SessionFile::summary).collect();
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(summaries)
}

/// Find a session by exact id, else by id prefix.
///
/// When several sessions share the prefix, the most recently updated wins.
///
/// # Errors
///
/// Returns `SessionNotFound` when nothing matches.
pub async fn find_session(dir: &Path, id: &str) -> Result<SessionFile> {
    let exact = SessionFile::path_for(dir, id);
    if tokio::fs::try_exists(&exact).await.unwrap_or(false) {
        if let Ok(file) = SessionFile::read(&exact).await {
            return Ok(file);
        }
    }

    if id.is_empty() {
        return Err(CodeCliError::SessionNotFound(id.to_string()));
    }

    read_all(dir)
        .await?
        .into_iter()
        .filter(|f| f.session.id.starts_with(id))
        .max_by_key(|f| f.session.updated_at)
        .ok_or_else(|| CodeCliError::SessionNotFound(id.to_string()))
}

/// The most recently updated session in `dir`, if any.
pub async fn latest_session(dir: &Path) -> Result<Option<SessionFile>> {
    Ok(read_all(dir)
        .await?
        .into_iter()
        .max_by_key(|f| f.session.updated_at))
}

/// First user message, truncated for listings.
fn extract_title(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| crate::utils::string::preview(&m.content.text(), 60))
        .unwrap_or_else(|| "(empty)".to_string())
}
