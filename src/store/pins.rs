//! Pinned notes, handoff lookup, recent and stale notes.

use anyhow::{bail, Context, Result};
use rusqlite::params;

use super::{note_from_row, NoteRecord, Store, NOTE_COLUMNS, PRIVATE_FILTER};

impl Store {
    /// Pin a note path so it always surfaces in context. Idempotent.
    pub fn pin_note(&self, path: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO pinned_notes (path) VALUES (?1)",
            params![path],
        )
        .context("pin note")?;
        Ok(())
    }

    /// Remove a pin. Errors if the path was not pinned.
    pub fn unpin_note(&self, path: &str) -> Result<()> {
        let conn = self.lock();
        let rows = conn
            .execute("DELETE FROM pinned_notes WHERE path = ?1", params![path])
            .context("unpin note")?;
        if rows == 0 {
            bail!("note is not pinned: {path}");
        }
        Ok(())
    }

    /// All pinned paths in pin order.
    pub fn pinned_paths(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT path FROM pinned_notes ORDER BY pinned_at ASC")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    /// Full root-chunk records for pinned notes, in pin order. A pinned
    /// path that later became private is filtered out.
    pub fn pinned_notes(&self) -> Result<Vec<NoteRecord>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM vault_notes n
             JOIN pinned_notes p ON p.path = n.path
             WHERE n.chunk_id = 0{PRIVATE_FILTER}
             ORDER BY p.pinned_at ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let notes = stmt
            .query_map([], note_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// The most recently modified handoff note, if any.
    pub fn latest_handoff(&self) -> Result<Option<NoteRecord>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM vault_notes n
             WHERE n.content_type = 'handoff' AND n.chunk_id = 0{PRIVATE_FILTER}
             ORDER BY n.modified DESC
             LIMIT 1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map([], note_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Most recently modified notes (root chunks), newest first.
    pub fn recent_notes(&self, limit: usize) -> Result<Vec<NoteRecord>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM vault_notes n
             WHERE n.chunk_id = 0{PRIVATE_FILTER}
             ORDER BY n.modified DESC
             LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let notes = stmt
            .query_map(params![limit.max(1) as i64], note_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    /// Notes carrying a review-by date, soonest first. Date comparison
    /// happens in the caller (review_by is free-form ISO text).
    pub fn notes_with_review_by(&self, limit: usize) -> Result<Vec<NoteRecord>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM vault_notes n
             WHERE n.chunk_id = 0 AND n.review_by != ''{PRIVATE_FILTER}
             ORDER BY n.review_by ASC
             LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let notes = stmt
            .query_map(params![limit.max(1) as i64], note_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }
}
