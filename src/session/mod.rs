//! Session module - conversation persistence for CodeCLI
//!
//! This module owns the message sequence of the active conversation and
//! its checkpoints, and persists both to `~/.codecli/sessions/{id}.json`.
//!
//! # Example
//!
//! ```
//! use codecli::session::{Message, SessionStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let dir = tempfile::tempdir().unwrap();
//!     let store = SessionStore::new(dir.path().join("sessions"), dir.path().to_path_buf());
//!
//!     store.create("ollama").await;
//!     store.add_message(Message::user("Hello!")).await;
//!     let cp = store.create_checkpoint(None).await;
//!     store.add_message(Message::assistant("Hi there!")).await;
//!
//!     assert!(store.rewind_to(&cp.id).await);
//!     assert_eq!(store.message_count().await, 1);
//!     store.save().await.unwrap();
//! }
//! ```

pub mod history;
pub mod types;

pub use history::{SessionFile, SessionPointer, SessionSummary, POINTER_FILE};
pub use types::{
    split_data_url, Checkpoint, Content, ContentPart, ImageUrl, Message, Role, SessionInfo,
    ToolCall, ToolResultRef,
};

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{CodeCliError, Result};

#[derive(Debug, Default)]
struct SessionState {
    info: Option<SessionInfo>,
    messages: Vec<Message>,
    checkpoints: Vec<Checkpoint>,
}

/// Store for the active conversation.
///
/// Cloning is cheap and every clone shares the same in-memory session.
#[derive(Clone)]
pub struct SessionStore {
    state: Arc<RwLock<SessionState>>,
    sessions_dir: PathBuf,
    workdir: PathBuf,
}

impl SessionStore {
    /// Create a store persisting into `sessions_dir`, with its pointer
    /// file in `workdir`. Nothing touches the disk until [`save`](Self::save).
    pub fn new(sessions_dir: PathBuf, workdir: PathBuf) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            sessions_dir,
            workdir,
        }
    }

    /// `~/.codecli/sessions`
    pub fn default_dir() -> PathBuf {
        Config::sessions_dir()
    }

    /// Directory the session documents live in.
    pub fn sessions_dir(&self) -> &std::path::Path {
        &self.sessions_dir
    }

    /// Start a new session, resetting messages and checkpoints.
    pub async fn create(&self, provider: &str) -> SessionInfo {
        let info = SessionInfo::new(provider, &self.workdir.to_string_lossy());
        let mut state = self.state.write().await;
        state.info = Some(info.clone());
        state.messages.clear();
        state.checkpoints.clear();
        debug!(session_id = %info.id, "Created session");
        info
    }

    /// The active session record, if one was created or loaded.
    pub async fn current(&self) -> Option<SessionInfo> {
        self.state.read().await.info.clone()
    }

    /// Append a message to the active conversation.
    pub async fn add_message(&self, message: Message) {
        self.state.write().await.messages.push(message);
    }

    /// Snapshot of the message sequence.
    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    /// Number of messages in the active conversation.
    pub async fn message_count(&self) -> usize {
        self.state.read().await.messages.len()
    }

    /// Snapshot of the checkpoint list, oldest first.
    pub async fn checkpoints(&self) -> Vec<Checkpoint> {
        self.state.read().await.checkpoints.clone()
    }

    /// Record a checkpoint at the current end of the conversation.
    ///
    /// # Arguments
    /// * `label` - Display label; defaults to `checkpoint-{n}`
    pub async fn create_checkpoint(&self, label: Option<&str>) -> Checkpoint {
        let mut state = self.state.write().await;
        let label = match label {
            Some(l) if !l.trim().is_empty() => l.trim().to_string(),
            _ => format!("checkpoint-{}", state.checkpoints.len() + 1),
        };
        let checkpoint = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            label,
            message_index: state.messages.len(),
            timestamp: Utc::now(),
        };
        state.checkpoints.push(checkpoint.clone());
        debug!(label = %checkpoint.label, index = checkpoint.message_index, "Checkpoint created");
        checkpoint
    }

    /// Truncate the conversation back to a checkpoint.
    ///
    /// Every checkpoint created after the target is discarded. Returns
    /// `false` when no checkpoint has the given id.
    pub async fn rewind_to(&self, checkpoint_id: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(pos) = state.checkpoints.iter().position(|c| c.id == checkpoint_id) else {
            return false;
        };
        let index = state.checkpoints[pos].message_index;
        state.messages.truncate(index);
        state.checkpoints.truncate(pos + 1);
        info!(checkpoint = %checkpoint_id, messages = index, "Rewound session");
        true
    }

    /// Replace the whole message sequence (compaction). Clears checkpoints.
    pub async fn replace_messages(&self, messages: Vec<Message>) {
        let mut state = self.state.write().await;
        state.messages = messages;
        state.checkpoints.clear();
    }

    /// Drop every message and checkpoint, keeping the session id.
    pub async fn clear_messages(&self) {
        let mut state = self.state.write().await;
        state.messages.clear();
        state.checkpoints.clear();
    }

    /// Persist the active session and update the local pointer file.
    ///
    /// A no-op when no session is active. A pointer write failure is logged
    /// and ignored; the session document is the source of truth.
    pub async fn save(&self) -> Result<()> {
        let file = {
            let mut state = self.state.write().await;
            let Some(info) = state.info.as_mut() else {
                return Ok(());
            };
            info.updated_at = Utc::now();
            SessionFile {
                session: info.clone(),
                messages: state.messages.clone(),
                checkpoints: state.checkpoints.clone(),
            }
        };

        let path = file.write(&self.sessions_dir).await?;
        debug!(path = %path.display(), messages = file.messages.len(), "Session saved");

        let pointer = SessionPointer {
            session_id: file.session.id.clone(),
            updated_at: file.session.updated_at,
        };
        if let Err(e) = pointer.write(&self.workdir).await {
            tracing::warn!(error = %e, "Failed to write session pointer");
        }
        Ok(())
    }

    /// Load a session by exact id, else by id prefix (latest match wins).
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` when nothing matches.
    pub async fn load(&self, id: &str) -> Result<SessionInfo> {
        let file = history::find_session(&self.sessions_dir, id).await?;
        Ok(self.activate(file).await)
    }

    /// Load the most recently updated stored session, if any.
    pub async fn load_latest(&self) -> Result<Option<SessionInfo>> {
        match history::latest_session(&self.sessions_dir).await? {
            Some(file) => Ok(Some(self.activate(file).await)),
            None => Ok(None),
        }
    }

    /// Resume the session named by the working directory's pointer file.
    ///
    /// Every failure (no pointer, stale id, unreadable file) yields `None`.
    pub async fn load_local(&self) -> Option<SessionInfo> {
        let pointer = SessionPointer::read(&self.workdir).await?;
        let path = SessionFile::path_for(&self.sessions_dir, &pointer.session_id);
        let file = SessionFile::read(&path).await.ok()?;
        Some(self.activate(file).await)
    }

    /// List stored sessions, most recently updated first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        history::list_sessions(&self.sessions_dir).await
    }

    /// The active session id or a `Session` error.
    pub async fn require_id(&self) -> Result<String> {
        self.current()
            .await
            .map(|info| info.id)
            .ok_or_else(|| CodeCliError::Session("no active session".to_string()))
    }

    async fn activate(&self, file: SessionFile) -> SessionInfo {
        let mut state = self.state.write().await;
        let info = file.session;
        state.info = Some(info.clone());
        state.messages = file.messages;
        state.checkpoints = file.checkpoints;
        info!(session_id = %info.id, messages = state.messages.len(), "Loaded session");
        info
    }
}
