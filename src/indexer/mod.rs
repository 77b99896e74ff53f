//! Incremental vault indexing.
//!
//! Orchestrates the walk → chunk → embed → store pipeline. Change
//! detection is by content hash alone: unchanged paths are skipped, paths
//! present in the store but gone from disk are deleted, and each changed
//! path is re-chunked and committed in a single transaction.

pub mod chunker;
pub mod frontmatter;
pub mod walker;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{SameConfig, MAX_EMBED_CHARS};
use crate::embedding::{EmbedRole, EmbeddingProvider};
use crate::memory::scoring;
use crate::store::{NoteRecord, Store};

/// Minimum interval between tool-server reindex invocations.
pub const REINDEX_COOLDOWN_SECS: i64 = 60;

/// Marker error for cooperative cancellation; callers downcast to map it
/// to a `cancelled` error kind.
#[derive(Debug)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Outcome of one indexing run.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct IndexReport {
    pub processed: usize,
    pub skipped_unchanged: usize,
    pub failed: usize,
    pub removed: usize,
}

impl std::fmt::Display for IndexReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {} unchanged, {} failed, {} removed",
            self.processed, self.skipped_unchanged, self.failed, self.removed
        )
    }
}

/// The vault indexer. With a provider it runs in full mode (chunks get
/// vectors); without one it runs lite — relational rows only, keyword and
/// FTS search still work.
pub struct Indexer<'a> {
    store: &'a Store,
    provider: Option<&'a dyn EmbeddingProvider>,
    config: &'a SameConfig,
    cancel: Arc<AtomicBool>,
}

impl<'a> Indexer<'a> {
    pub fn new(
        store: &'a Store,
        provider: Option<&'a dyn EmbeddingProvider>,
        config: &'a SameConfig,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            cancel,
        }
    }

    /// Run a full indexing pass. `force` bypasses hash comparison and
    /// reindexes everything.
    pub fn run(&self, force: bool) -> Result<IndexReport> {
        let vault = self.config.vault_path();
        let files = walker::walk_vault(&vault, &self.config.skip_dirs())
            .context("walk vault")?;
        let known_hashes = self.store.content_hash_map()?;

        let mut report = IndexReport::default();
        let mut seen_paths = std::collections::HashSet::new();

        for file in &files {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(Cancelled.into());
            }
            seen_paths.insert(file.rel_path.clone());

            match self.index_file(file, &known_hashes, force) {
                Ok(IndexOutcome::Indexed) => report.processed += 1,
                Ok(IndexOutcome::Unchanged) => report.skipped_unchanged += 1,
                Err(err) => {
                    // One bad file never aborts the run; the note keeps its
                    // prior indexed state.
                    tracing::warn!(path = %file.rel_path, error = %err, "indexing failed, skipping");
                    report.failed += 1;
                }
            }
        }

        // Paths in the store but gone from disk are deleted.
        for path in known_hashes.keys() {
            if !seen_paths.contains(path) {
                match self.store.delete_note(path) {
                    Ok(_) => report.removed += 1,
                    Err(err) => {
                        tracing::warn!(path = %path, error = %err, "failed to remove vanished note");
                        report.failed += 1;
                    }
                }
            }
        }

        let now = chrono::Utc::now().timestamp();
        self.store.set_last_reindex(now)?;
        // Lightweight marker next to the database, readable without
        // opening it.
        let marker = self.config.data_dir().join("last_reindex");
        if let Err(err) = std::fs::write(&marker, format!("{now}\n")) {
            tracing::debug!(error = %err, "could not write reindex marker");
        }

        tracing::info!(%report, "index run complete");
        Ok(report)
    }

    fn index_file(
        &self,
        file: &walker::WalkedFile,
        known_hashes: &std::collections::HashMap<String, String>,
        force: bool,
    ) -> Result<IndexOutcome> {
        let raw = std::fs::read(&file.abs_path)
            .with_context(|| format!("read {}", file.abs_path.display()))?;
        let content_hash = hash_bytes(&raw);

        if !force && known_hashes.get(&file.rel_path) == Some(&content_hash) {
            return Ok(IndexOutcome::Unchanged);
        }

        let content = String::from_utf8_lossy(&raw);
        let records = build_records(&file.rel_path, &content, &content_hash, file.modified)?;

        let vectors = match self.provider {
            Some(provider) => {
                let mut vecs = Vec::with_capacity(records.len());
                for rec in &records {
                    if self.cancel.load(Ordering::Relaxed) {
                        return Err(Cancelled.into());
                    }
                    let vec = provider
                        .embed(&rec.text, EmbedRole::Document)
                        .with_context(|| format!("embed chunk {}", rec.chunk_id))?;
                    vecs.push(vec);
                }
                Some(vecs)
            }
            None => None,
        };

        self.store
            .replace_note(&file.rel_path, &records, vectors.as_deref())?;
        Ok(IndexOutcome::Indexed)
    }
}

enum IndexOutcome {
    Indexed,
    Unchanged,
}

/// Hex SHA-256 of the raw file bytes — the only signal used for
/// incremental reindex decisions.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Turn one note file into its chunk rows. Fails if any chunk is still
/// oversized after every split strategy — the path keeps its prior state.
pub fn build_records(
    rel_path: &str,
    content: &str,
    content_hash: &str,
    modified: f64,
) -> Result<Vec<NoteRecord>> {
    let (fm, body) = frontmatter::parse(content);

    let title = fm.title.clone().unwrap_or_else(|| file_stem(rel_path));
    let content_type =
        scoring::infer_content_type(rel_path, fm.content_type.as_deref(), &fm.tags);
    let review_by = fm.review_by.clone().unwrap_or_default();
    let confidence = fm
        .confidence
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or_else(|| scoring::compute_confidence(content_type, 0, !review_by.is_empty()));

    let chunks = chunker::chunk_note(body);
    // A lone paragraph can defeat every splitting strategy; give it a
    // little slack beyond the embed limit before failing the path.
    if let Some(big) = chunks
        .iter()
        .find(|c| c.text.len() > MAX_EMBED_CHARS + MAX_EMBED_CHARS / 4)
    {
        anyhow::bail!(
            "chunk {:?} still {} chars after all splits",
            big.heading,
            big.text.len()
        );
    }

    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut rec = NoteRecord::new(rel_path, &title, i as i64, &chunk.heading, &chunk.text);
            rec.tags = fm.tags.clone();
            rec.domain = fm.domain.clone().unwrap_or_default();
            rec.workstream = fm.workstream.clone().unwrap_or_default();
            rec.agent = fm.agent.clone().unwrap_or_default();
            rec.modified = modified;
            rec.content_hash = content_hash.to_string();
            rec.content_type = content_type;
            rec.review_by = review_by.clone();
            rec.confidence = confidence;
            rec
        })
        .collect())
}

fn file_stem(rel_path: &str) -> String {
    Path::new(rel_path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| rel_path.to_string())
}

/// True when a tool-server reindex request arrives inside the cooldown
/// window.
pub fn in_cooldown(store: &Store) -> Result<bool> {
    let Some(last) = store.last_reindex()? else {
        return Ok(false);
    };
    let elapsed = chrono::Utc::now().timestamp() - last;
    Ok(elapsed >= 0 && elapsed < REINDEX_COOLDOWN_SECS)
}
