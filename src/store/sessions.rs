//! Session log and context-usage tracking.
//!
//! Session rows are keyed by the host-supplied session id; insertion is
//! idempotent. Usage rows are append-only — only the referenced flag is
//! ever updated after insert.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::Store;

/// A session lifecycle record.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub started_at: String,
    pub ended_at: String,
    pub handoff_path: String,
    pub machine: String,
    pub files_changed: Vec<String>,
    pub summary: String,
}

/// One context-injection event.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UsageRecord {
    pub session_id: String,
    pub timestamp: String,
    pub hook_name: String,
    pub injected_paths: Vec<String>,
    pub estimated_tokens: i64,
    pub was_referenced: bool,
}

impl Store {
    /// Insert or replace a session record (idempotent on session id).
    pub fn upsert_session(&self, record: &SessionRecord) -> Result<()> {
        let files_json = serde_json::to_string(&record.files_changed)?;
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO session_log \
             (session_id, started_at, ended_at, handoff_path, machine, files_changed, summary) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.session_id,
                record.started_at,
                record.ended_at,
                record.handoff_path,
                record.machine,
                files_json,
                record.summary,
            ],
        )
        .context("upsert session")?;
        Ok(())
    }

    /// Fetch a session record by id.
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT session_id, started_at, ended_at, handoff_path, machine, files_changed, summary \
                 FROM session_log WHERE session_id = ?1",
                params![session_id],
                |row| {
                    let files_json: String = row.get(5)?;
                    Ok(SessionRecord {
                        session_id: row.get(0)?,
                        started_at: row.get(1)?,
                        ended_at: row.get(2)?,
                        handoff_path: row.get(3)?,
                        machine: row.get(4)?,
                        files_changed: serde_json::from_str(&files_json).unwrap_or_default(),
                        summary: row.get(6)?,
                    })
                },
            )
            .optional()
            .context("get session")?;
        Ok(row)
    }

    /// Append a context-injection record for budget tracking.
    pub fn log_injection(
        &self,
        session_id: &str,
        hook_name: &str,
        injected_paths: &[String],
        estimated_tokens: usize,
    ) -> Result<()> {
        let paths_json = serde_json::to_string(injected_paths)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO context_usage (session_id, timestamp, hook_name, injected_paths, estimated_tokens) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, now, hook_name, paths_json, estimated_tokens as i64],
        )
        .context("log injection")?;
        Ok(())
    }

    /// Mark every injection in a session as referenced, called once the
    /// agent is observed actually citing an injected path.
    pub fn mark_referenced(&self, session_id: &str) -> Result<usize> {
        let conn = self.lock();
        let rows = conn
            .execute(
                "UPDATE context_usage SET was_referenced = 1 WHERE session_id = ?1",
                params![session_id],
            )
            .context("mark referenced")?;
        Ok(rows)
    }

    /// All usage rows for a session, oldest first.
    pub fn usage_for_session(&self, session_id: &str) -> Result<Vec<UsageRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, timestamp, hook_name, injected_paths, estimated_tokens, was_referenced \
             FROM context_usage WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                let paths_json: String = row.get(3)?;
                let referenced: i64 = row.get(5)?;
                Ok(UsageRecord {
                    session_id: row.get(0)?,
                    timestamp: row.get(1)?,
                    hook_name: row.get(2)?,
                    injected_paths: serde_json::from_str(&paths_json).unwrap_or_default(),
                    estimated_tokens: row.get(4)?,
                    was_referenced: referenced != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
