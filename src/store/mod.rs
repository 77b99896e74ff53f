//! Durable note storage — relational rows plus aligned vectors.
//!
//! [`Store`] wraps a single SQLite connection behind a mutex. Write paths
//! hold the lock across their whole transaction, so a query never observes
//! a partially replaced note; reads take the lock only for the duration of
//! one statement.

pub mod pins;
pub mod search;
pub mod sessions;

pub use search::{RawHit, SearchHit, SearchOptions};
pub use sessions::{SessionRecord, UsageRecord};

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::db;
use crate::embedding::vec_to_blob;

/// Content categories; they control recency decay and surfacing priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Note,
    Handoff,
    Decision,
    Research,
    Project,
    Hub,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Handoff => "handoff",
            Self::Decision => "decision",
            Self::Research => "research",
            Self::Project => "project",
            Self::Hub => "hub",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "note" => Ok(Self::Note),
            "handoff" => Ok(Self::Handoff),
            "decision" => Ok(Self::Decision),
            "research" => Ok(Self::Research),
            "project" => Ok(Self::Project),
            "hub" => Ok(Self::Hub),
            _ => Err(format!("unknown content type: {s}")),
        }
    }
}

/// One chunk row of an indexed note.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NoteRecord {
    /// SQLite rowid; 0 before insert.
    #[serde(skip)]
    pub id: i64,
    /// Vault-relative, forward-slash normalized.
    pub path: String,
    pub title: String,
    pub tags: Vec<String>,
    pub domain: String,
    pub workstream: String,
    pub agent: String,
    pub chunk_id: i64,
    pub chunk_heading: String,
    pub text: String,
    /// Seconds since epoch.
    pub modified: f64,
    /// Hex SHA-256 of the raw file bytes.
    pub content_hash: String,
    pub content_type: ContentType,
    /// Optional ISO-8601 review-by date; empty when unset.
    pub review_by: String,
    pub confidence: f64,
    pub access_count: i64,
}

impl NoteRecord {
    /// A minimal record with the required fields filled in.
    pub fn new(path: &str, title: &str, chunk_id: i64, heading: &str, text: &str) -> Self {
        Self {
            id: 0,
            path: path.to_string(),
            title: title.to_string(),
            tags: Vec::new(),
            domain: String::new(),
            workstream: String::new(),
            agent: String::new(),
            chunk_id,
            chunk_heading: heading.to_string(),
            text: text.to_string(),
            modified: 0.0,
            content_hash: String::new(),
            content_type: ContentType::Note,
            review_by: String::new(),
            confidence: 0.5,
            access_count: 0,
        }
    }
}

/// SQL fragment rejecting private paths, appended to every public query.
/// Both separator variants are covered; comparison is on the upper-cased
/// path so case tricks don't slip through.
pub(crate) const PRIVATE_FILTER: &str = r#" AND UPPER(n.path) NOT LIKE '\_PRIVATE/%' ESCAPE '\'
  AND UPPER(n.path) NOT LIKE '\_PRIVATE\\%' ESCAPE '\'"#;

pub(crate) const NOTE_COLUMNS: &str = "n.id, n.path, n.title, n.tags, n.domain, n.workstream, n.agent, \
     n.chunk_id, n.chunk_heading, n.text, n.modified, n.content_hash, \
     n.content_type, n.review_by, n.confidence, n.access_count";

pub(crate) fn note_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NoteRecord> {
    let tags_json: String = row.get(3)?;
    let content_type: String = row.get(12)?;
    Ok(NoteRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        title: row.get(2)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        domain: row.get(4)?,
        workstream: row.get(5)?,
        agent: row.get(6)?,
        chunk_id: row.get(7)?,
        chunk_heading: row.get(8)?,
        text: row.get(9)?,
        modified: row.get(10)?,
        content_hash: row.get(11)?,
        content_type: content_type.parse().unwrap_or(ContentType::Note),
        review_by: row.get(13)?,
        confidence: row.get(14)?,
        access_count: row.get(15)?,
    })
}

/// The vault store: one connection per process, writes serialized.
pub struct Store {
    conn: Mutex<Connection>,
    dim: usize,
}

impl Store {
    /// Open (or create) the store at the given database path.
    pub fn open(path: impl AsRef<Path>, dim: usize) -> Result<Self> {
        let conn = db::open_database(path, dim)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dim,
        })
    }

    /// In-memory store for tests and tooling.
    pub fn open_in_memory(dim: usize) -> Result<Self> {
        let conn = db::open_memory_database(dim)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dim,
        })
    }

    /// Configured vector dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace every chunk of `path` with the given records (and vectors,
    /// when embedding is enabled) in a single transaction.
    ///
    /// Preconditions checked before any write: records and vectors align
    /// one-to-one, every vector has the configured dimension, every record
    /// carries a non-empty path and content hash, and chunk ids form a
    /// contiguous sequence starting at 0. Either every pair lands or none
    /// does.
    pub fn replace_note(
        &self,
        path: &str,
        records: &[NoteRecord],
        vectors: Option<&[Vec<f32>]>,
    ) -> Result<()> {
        validate_batch(path, records, vectors, self.dim)?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        delete_chunks_tx(&tx, path)?;
        insert_chunks_tx(&tx, records, vectors)?;
        tx.commit()?;
        Ok(())
    }

    /// Insert a batch of note records (spanning one or more paths) with an
    /// equally sized vector batch. Atomic; same preconditions as
    /// [`Store::replace_note`], applied per path.
    pub fn bulk_insert_notes(
        &self,
        records: &[NoteRecord],
        vectors: Option<&[Vec<f32>]>,
    ) -> Result<()> {
        let mut by_path: HashMap<&str, Vec<&NoteRecord>> = HashMap::new();
        for rec in records {
            by_path.entry(rec.path.as_str()).or_default().push(rec);
        }
        for (path, group) in &by_path {
            let owned: Vec<NoteRecord> = group.iter().map(|r| (*r).clone()).collect();
            validate_batch(path, &owned, None, self.dim)?;
        }
        if let Some(vecs) = vectors {
            if vecs.len() != records.len() {
                bail!("vector batch size {} != record batch size {}", vecs.len(), records.len());
            }
            for v in vecs {
                if v.len() != self.dim {
                    bail!("vector dimension {} != configured {}", v.len(), self.dim);
                }
            }
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        insert_chunks_tx(&tx, records, vectors)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete all chunks (rows, vectors, FTS entries) for a path.
    pub fn delete_note(&self, path: &str) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let removed = delete_chunks_tx(&tx, path)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Map of {path → content_hash} built from root chunks, used for
    /// incremental reindex decisions.
    pub fn content_hash_map(&self) -> Result<HashMap<String, String>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT path, content_hash FROM vault_notes WHERE chunk_id = 0")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().collect())
    }

    /// Number of distinct notes (root chunks).
    pub fn note_count(&self) -> Result<i64> {
        let conn = self.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM vault_notes WHERE chunk_id = 0",
            [],
            |row| row.get(0),
        )
        .context("note count")
    }

    /// Total number of chunk rows.
    pub fn chunk_count(&self) -> Result<i64> {
        let conn = self.lock();
        conn.query_row("SELECT COUNT(*) FROM vault_notes", [], |row| row.get(0))
            .context("chunk count")
    }

    /// Fetch every chunk of a note in chunk order. Private paths come back
    /// empty — absence is indistinguishable from exclusion.
    pub fn get_note(&self, path: &str) -> Result<Vec<NoteRecord>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM vault_notes n WHERE n.path = ?1{PRIVATE_FILTER} ORDER BY n.chunk_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![path], note_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Increment access counters for the given paths (root chunks).
    pub fn bump_access(&self, paths: &[&str]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "UPDATE vault_notes SET access_count = access_count + 1 WHERE path = ?1 AND chunk_id = 0",
        )?;
        for path in paths {
            stmt.execute(params![path])?;
        }
        Ok(())
    }

    /// Record the completion time of a reindex run.
    pub fn set_last_reindex(&self, epoch_secs: i64) -> Result<()> {
        let conn = self.lock();
        db::migrations::set_last_reindex(&conn, epoch_secs)?;
        Ok(())
    }

    /// Completion time of the last reindex run, if any.
    pub fn last_reindex(&self) -> Result<Option<i64>> {
        let conn = self.lock();
        Ok(db::migrations::get_last_reindex(&conn)?)
    }
}

fn validate_batch(
    path: &str,
    records: &[NoteRecord],
    vectors: Option<&[Vec<f32>]>,
    dim: usize,
) -> Result<()> {
    if path.is_empty() {
        bail!("empty path");
    }
    if let Some(vecs) = vectors {
        if vecs.len() != records.len() {
            bail!(
                "vector batch size {} != record batch size {} for {path}",
                vecs.len(),
                records.len()
            );
        }
        for v in vecs {
            if v.len() != dim {
                bail!("vector dimension {} != configured {} for {path}", v.len(), dim);
            }
        }
    }
    for (i, rec) in records.iter().enumerate() {
        if rec.path != path {
            bail!("record path {:?} does not match batch path {path:?}", rec.path);
        }
        if rec.content_hash.is_empty() {
            bail!("empty content hash for {path}");
        }
        if rec.chunk_id != i as i64 {
            bail!(
                "chunk ids for {path} must be contiguous from 0, got {} at position {i}",
                rec.chunk_id
            );
        }
    }
    Ok(())
}

fn delete_chunks_tx(tx: &Transaction<'_>, path: &str) -> Result<usize> {
    tx.execute(
        "DELETE FROM vault_notes_vec WHERE note_id IN (SELECT id FROM vault_notes WHERE path = ?1)",
        params![path],
    )?;
    tx.execute("DELETE FROM vault_notes_fts WHERE path = ?1", params![path])?;
    let removed = tx.execute("DELETE FROM vault_notes WHERE path = ?1", params![path])?;
    Ok(removed)
}

fn insert_chunks_tx(
    tx: &Transaction<'_>,
    records: &[NoteRecord],
    vectors: Option<&[Vec<f32>]>,
) -> Result<()> {
    let mut insert_note = tx.prepare(
        "INSERT INTO vault_notes (path, title, tags, domain, workstream, agent, chunk_id, \
         chunk_heading, text, modified, content_hash, content_type, review_by, confidence, access_count) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
    )?;
    let mut insert_fts = tx.prepare(
        "INSERT INTO vault_notes_fts (title, text, path, note_id) VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut insert_vec =
        tx.prepare("INSERT INTO vault_notes_vec (note_id, embedding) VALUES (?1, ?2)")?;

    for (i, rec) in records.iter().enumerate() {
        let tags_json = serde_json::to_string(&rec.tags)?;
        insert_note.execute(params![
            rec.path,
            rec.title,
            tags_json,
            rec.domain,
            rec.workstream,
            rec.agent,
            rec.chunk_id,
            rec.chunk_heading,
            rec.text,
            rec.modified,
            rec.content_hash,
            rec.content_type.as_str(),
            rec.review_by,
            rec.confidence,
            rec.access_count,
        ])?;
        let rowid = tx.last_insert_rowid();

        insert_fts.execute(params![rec.title, rec.text, rec.path, rowid])?;

        if let Some(vecs) = vectors {
            insert_vec.execute(params![rowid, vec_to_blob(&vecs[i])])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> Store {
        Store::open_in_memory(8).unwrap()
    }

    fn record(path: &str, chunk_id: i64, text: &str) -> NoteRecord {
        let mut rec = NoteRecord::new(path, "Title", chunk_id, "(full)", text);
        rec.content_hash = "abc123".into();
        rec.modified = 1_700_000_000.0;
        rec
    }

    fn vector(seed: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 8];
        v[seed % 8] = 1.0;
        v
    }

    #[test]
    fn replace_note_roundtrip() {
        let store = test_store();
        let records = vec![record("notes/a.md", 0, "hello world")];
        store
            .replace_note("notes/a.md", &records, Some(&[vector(0)]))
            .unwrap();

        let fetched = store.get_note("notes/a.md").unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].path, "notes/a.md");
        assert_eq!(fetched[0].text, "hello world");
        assert_eq!(fetched[0].content_hash, "abc123");
        assert_eq!(fetched[0].content_type, ContentType::Note);
        assert_eq!(fetched[0].modified, 1_700_000_000.0);
    }

    #[test]
    fn replace_note_swaps_all_chunks() {
        let store = test_store();
        let old = vec![
            record("a.md", 0, "old root"),
            record("a.md", 1, "old second"),
        ];
        store
            .replace_note("a.md", &old, Some(&[vector(0), vector(1)]))
            .unwrap();

        let new = vec![record("a.md", 0, "new root")];
        store.replace_note("a.md", &new, Some(&[vector(2)])).unwrap();

        let fetched = store.get_note("a.md").unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].text, "new root");
        assert_eq!(store.chunk_count().unwrap(), 1);
    }

    #[test]
    fn wrong_dimension_is_rejected_before_any_write() {
        let store = test_store();
        let records = vec![record("a.md", 0, "x")];
        let bad = vec![vec![0.0f32; 4]];
        assert!(store.replace_note("a.md", &records, Some(&bad)).is_err());
        assert_eq!(store.note_count().unwrap(), 0);
    }

    #[test]
    fn non_contiguous_chunk_ids_rejected() {
        let store = test_store();
        let records = vec![record("a.md", 0, "x"), record("a.md", 2, "y")];
        let err = store
            .replace_note("a.md", &records, Some(&[vector(0), vector(1)]))
            .unwrap_err();
        assert!(err.to_string().contains("contiguous"));
    }

    #[test]
    fn empty_hash_rejected() {
        let store = test_store();
        let mut rec = record("a.md", 0, "x");
        rec.content_hash = String::new();
        assert!(store.replace_note("a.md", &[rec], None).is_err());
    }

    #[test]
    fn mismatched_vector_count_rejected() {
        let store = test_store();
        let records = vec![record("a.md", 0, "x"), record("a.md", 1, "y")];
        let err = store
            .replace_note("a.md", &records, Some(&[vector(0)]))
            .unwrap_err();
        assert!(err.to_string().contains("batch size"));
        assert_eq!(store.chunk_count().unwrap(), 0);
    }

    #[test]
    fn lite_mode_insert_without_vectors() {
        let store = test_store();
        store
            .replace_note("a.md", &[record("a.md", 0, "keyword only")], None)
            .unwrap();
        assert_eq!(store.note_count().unwrap(), 1);

        let conn = store.lock();
        let vec_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vault_notes_vec", [], |r| r.get(0))
            .unwrap();
        assert_eq!(vec_count, 0);
    }

    #[test]
    fn content_hash_map_uses_root_chunks() {
        let store = test_store();
        let mut second = record("a.md", 1, "second");
        second.content_hash = "abc123".into();
        store
            .replace_note("a.md", &[record("a.md", 0, "root"), second], None)
            .unwrap();

        let map = store.content_hash_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a.md").map(String::as_str), Some("abc123"));
    }

    #[test]
    fn get_note_hides_private_paths() {
        let store = test_store();
        store
            .replace_note("_PRIVATE/secret.md", &[record("_PRIVATE/secret.md", 0, "shh")], None)
            .unwrap();

        // Row exists at the SQL level but the public accessor filters it.
        assert!(store.get_note("_PRIVATE/secret.md").unwrap().is_empty());
    }

    #[test]
    fn delete_note_removes_rows_and_fts() {
        let store = test_store();
        store
            .replace_note("a.md", &[record("a.md", 0, "hello")], Some(&[vector(0)]))
            .unwrap();
        let removed = store.delete_note("a.md").unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.chunk_count().unwrap(), 0);

        let conn = store.lock();
        let fts_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vault_notes_fts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fts_count, 0);
        let vec_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vault_notes_vec", [], |r| r.get(0))
            .unwrap();
        assert_eq!(vec_count, 0);
    }

    #[test]
    fn bump_access_increments_root_chunk() {
        let store = test_store();
        store
            .replace_note("a.md", &[record("a.md", 0, "hello")], None)
            .unwrap();
        store.bump_access(&["a.md"]).unwrap();
        store.bump_access(&["a.md"]).unwrap();
        let fetched = store.get_note("a.md").unwrap();
        assert_eq!(fetched[0].access_count, 2);
    }
}
