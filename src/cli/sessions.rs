//! `codecli sessions`: list saved conversations.

use anyhow::{Context, Result};

use codecli::session::{history, SessionStore, SessionSummary};

pub(crate) async fn cmd_sessions(limit: usize) -> Result<()> {
    let dir = SessionStore::default_dir();
    let sessions = history::list_sessions(&dir)
        .await
        .with_context(|| format!("Failed to read sessions from {}", dir.display()))?;

    if sessions.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }

    println!("\nSaved Sessions:\n");
    for line in sessions.iter().take(limit).map(format_summary) {
        println!("{}", line);
    }
    if sessions.len() > limit {
        println!("\n  ... and {} more", sessions.len() - limit);
    }
    println!();
    Ok(())
}

fn format_summary(s: &SessionSummary) -> String {
    format!(
        "  {}  {}  {:<12}  {:>3} msgs  {}  {}",
        s.id.get(..8).unwrap_or(&s.id),
        s.updated_at.format("%Y-%m-%d %H:%M"),
        s.provider,
        s.message_count,
        s.title,
        s.cwd
    )
}
