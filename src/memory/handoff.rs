//! Handoff note generation.
//!
//! At session end, a markdown artifact summarizing the session (what was
//! asked, what changed, where the transcript lives) is written under the
//! handoff directory so the next session can pick up where this one left
//! off. The session log row is updated alongside.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

use super::transcript::TranscriptData;
use crate::store::{SessionRecord, Store};

/// Outcome of a handoff write.
#[derive(Debug)]
pub struct HandoffResult {
    /// Vault-relative path of the written note.
    pub path: String,
    pub session_id: String,
}

/// Write a handoff note for a session and record it in the session log.
pub fn write_handoff(
    store: &Store,
    vault_root: &Path,
    handoff_dir: &str,
    session_id: &str,
    transcript_path: &Path,
    transcript: &TranscriptData,
) -> Result<HandoffResult> {
    if transcript.messages.is_empty() {
        anyhow::bail!("transcript has no messages, nothing to hand off");
    }

    let now = Utc::now();
    let short_id: String = session_id.chars().take(8).collect();
    let short_id = if short_id.is_empty() {
        "session".to_string()
    } else {
        short_id
    };
    let filename = format!("{}-{}.md", short_id, now.format("%Y%m%d-%H%M%S"));
    let rel_path = format!("{}/{}", handoff_dir.trim_matches('/'), filename);

    let abs_dir: PathBuf = vault_root.join(handoff_dir.trim_matches('/'));
    std::fs::create_dir_all(&abs_dir)
        .with_context(|| format!("create {}", abs_dir.display()))?;

    let body = render_handoff(session_id, transcript_path, transcript, &now);
    let abs_path = abs_dir.join(&filename);
    std::fs::write(&abs_path, body)
        .with_context(|| format!("write {}", abs_path.display()))?;

    let record = SessionRecord {
        session_id: session_id.to_string(),
        started_at: String::new(),
        ended_at: now.to_rfc3339(),
        handoff_path: rel_path.clone(),
        machine: hostname(),
        files_changed: transcript.files_changed.clone(),
        summary: first_user_line(transcript).unwrap_or_default(),
    };
    if let Err(err) = store.upsert_session(&record) {
        tracing::warn!(error = %err, "session log update failed");
    }

    Ok(HandoffResult {
        path: rel_path,
        session_id: session_id.to_string(),
    })
}

fn render_handoff(
    session_id: &str,
    transcript_path: &Path,
    transcript: &TranscriptData,
    now: &chrono::DateTime<Utc>,
) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("title: Session handoff {}\n", now.format("%Y-%m-%d %H:%M")));
    out.push_str("content_type: handoff\n");
    out.push_str(&format!("agent: {session_id}\n"));
    out.push_str("---\n\n");

    if let Some(opening) = first_user_line(transcript) {
        out.push_str("## Session focus\n\n");
        out.push_str(&opening);
        out.push_str("\n\n");
    }

    out.push_str("## Files changed\n\n");
    if transcript.files_changed.is_empty() {
        out.push_str("(none detected)\n");
    } else {
        for file in &transcript.files_changed {
            out.push_str(&format!("- {file}\n"));
        }
    }

    out.push_str(&format!(
        "\n## Session\n\n- id: {session_id}\n- messages: {}\n- tool calls: {}\n- transcript: {}\n",
        transcript.messages.len(),
        transcript.tool_calls.len(),
        transcript_path.display()
    ));
    out
}

/// The first user message, truncated to one readable line.
fn first_user_line(transcript: &TranscriptData) -> Option<String> {
    let first = transcript.messages.iter().find(|m| m.role == "user")?;
    let line = first.content.lines().next().unwrap_or_default().trim();
    if line.is_empty() {
        return None;
    }
    let mut summary = line.to_string();
    if summary.len() > 200 {
        let cut = crate::store::search::floor_char_boundary(&summary, 200);
        summary.truncate(cut);
        summary.push_str("...");
    }
    Some(summary)
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_default()
}
