//! SQL DDL for all SAME tables.
//!
//! Defines `vault_notes` (one row per chunk), `vault_notes_vec` (vec0),
//! `vault_notes_fts` (FTS5), `session_log`, `context_usage`, `pinned_notes`,
//! and `schema_meta`. All DDL uses `IF NOT EXISTS` for idempotent
//! initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- One row per chunk of every indexed note. chunk_id 0 is the root row;
-- operations that want one row per note filter on chunk_id = 0.
CREATE TABLE IF NOT EXISTS vault_notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    title TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    domain TEXT NOT NULL DEFAULT '',
    workstream TEXT NOT NULL DEFAULT '',
    agent TEXT NOT NULL DEFAULT '',
    chunk_id INTEGER NOT NULL,
    chunk_heading TEXT NOT NULL,
    text TEXT NOT NULL,
    modified REAL NOT NULL,
    content_hash TEXT NOT NULL,
    content_type TEXT NOT NULL DEFAULT 'note'
        CHECK(content_type IN ('note','handoff','decision','research','project','hub')),
    review_by TEXT NOT NULL DEFAULT '',
    confidence REAL NOT NULL DEFAULT 0.5 CHECK(confidence >= 0.0 AND confidence <= 1.0),
    access_count INTEGER NOT NULL DEFAULT 0,
    UNIQUE(path, chunk_id)
);

CREATE INDEX IF NOT EXISTS idx_vault_notes_path ON vault_notes(path);
CREATE INDEX IF NOT EXISTS idx_vault_notes_content_hash ON vault_notes(content_hash);
CREATE INDEX IF NOT EXISTS idx_vault_notes_content_type ON vault_notes(content_type);
CREATE INDEX IF NOT EXISTS idx_vault_notes_domain ON vault_notes(domain);
CREATE INDEX IF NOT EXISTS idx_vault_notes_workstream ON vault_notes(workstream);
CREATE INDEX IF NOT EXISTS idx_vault_notes_modified ON vault_notes(modified);

-- Full-text search over titles and chunk text, synced in the same
-- transactions that mutate vault_notes.
CREATE VIRTUAL TABLE IF NOT EXISTS vault_notes_fts USING fts5(
    title,
    text,
    path UNINDEXED,
    note_id UNINDEXED
);

-- Session lifecycle log; insertion is idempotent on session_id.
CREATE TABLE IF NOT EXISTS session_log (
    session_id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    ended_at TEXT NOT NULL,
    handoff_path TEXT NOT NULL DEFAULT '',
    machine TEXT NOT NULL DEFAULT '',
    files_changed TEXT NOT NULL DEFAULT '[]',
    summary TEXT NOT NULL DEFAULT ''
);

-- Append-only record of context injections; only was_referenced is ever
-- updated after insert.
CREATE TABLE IF NOT EXISTS context_usage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    hook_name TEXT NOT NULL,
    injected_paths TEXT NOT NULL DEFAULT '[]',
    estimated_tokens INTEGER NOT NULL DEFAULT 0,
    was_referenced INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_context_usage_session ON context_usage(session_id);

-- Paths that always surface in context regardless of score.
CREATE TABLE IF NOT EXISTS pinned_notes (
    path TEXT PRIMARY KEY,
    pinned_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection, dim: usize) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // vec0 virtual table must be created separately (sqlite-vec syntax);
    // the dimension is baked into the DDL.
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vault_notes_vec USING vec0(
            note_id INTEGER PRIMARY KEY,
            embedding float[{dim}]
        );"
    ))?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 8).unwrap();
        init_schema(&conn, 8).unwrap();
    }

    #[test]
    fn content_type_check_constraint() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 8).unwrap();

        let err = conn.execute(
            "INSERT INTO vault_notes (path, title, chunk_id, chunk_heading, text, modified, content_hash, content_type)
             VALUES ('a.md', 'A', 0, '(full)', 'x', 0.0, 'h', 'bogus')",
            [],
        );
        assert!(err.is_err());
    }

    #[test]
    fn path_chunk_unique_constraint() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 8).unwrap();

        let insert = "INSERT INTO vault_notes (path, title, chunk_id, chunk_heading, text, modified, content_hash)
                      VALUES ('a.md', 'A', 0, '(full)', 'x', 0.0, 'h')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
