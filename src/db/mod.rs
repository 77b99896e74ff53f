pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the vault database at the given path, with all
/// extensions loaded and schema initialized for the given vector dimension.
pub fn open_database(path: impl AsRef<Path>, dim: usize) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create data dir {}", parent.display()))?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL for concurrent reads during reindex; wait up to 5s for locks.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "busy_timeout", "5000")?;

    schema::init_schema(&conn, dim).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    // Embedding dimension is fixed at first open; a change requires a full
    // re-index with a fresh database.
    if let Some(stored) = migrations::get_embedding_dim(&conn)? {
        if stored != dim {
            anyhow::bail!(
                "embedding dimension mismatch: database has {stored}, configured {dim}. \
                 Delete {} and reindex, or restore the original dimension.",
                path.display()
            );
        }
    } else {
        migrations::set_embedding_dim(&conn, dim)?;
    }

    let integrity: String = conn.pragma_query_value(None, "quick_check", |row| row.get(0))?;
    if integrity != "ok" {
        anyhow::bail!("database integrity check failed: {integrity}");
    }

    tracing::info!(path = %path.display(), dim, "database ready");
    Ok(conn)
}

/// Open an in-memory database for tests and tooling.
pub fn open_memory_database(dim: usize) -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    schema::init_schema(&conn, dim).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    migrations::set_embedding_dim(&conn, dim)?;
    Ok(conn)
}
