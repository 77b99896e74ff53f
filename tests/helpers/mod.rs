#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use same::config::SameConfig;
use same::embedding::{EmbedRole, EmbeddingProvider};
use same::indexer::{IndexReport, Indexer};
use same::store::{NoteRecord, Store};

/// Test vector dimension, small enough to reason about by hand.
pub const DIM: usize = 8;

/// Open a fresh in-memory store at the test dimension.
pub fn test_store() -> Store {
    Store::open_in_memory(DIM).unwrap()
}

/// Deterministic embedding with a spike at `seed`. Distinct seeds give
/// orthogonal vectors.
pub fn spike(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[seed % DIM] = 1.0;
    v
}

/// Build a config rooted at a temp vault with embeddings disabled.
pub fn vault_config(vault: &Path) -> SameConfig {
    let mut config = SameConfig::default();
    config.vault.path = vault.to_string_lossy().into_owned();
    config.embedding.provider = "none".into();
    config.embedding.dim = DIM;
    config
}

/// Insert a root-chunk note directly into the store.
pub fn insert_note(store: &Store, path: &str, text: &str, vector: Option<Vec<f32>>) {
    let mut rec = NoteRecord::new(path, path.trim_end_matches(".md"), 0, "(full)", text);
    rec.content_hash = format!("hash-{path}");
    rec.modified = chrono::Utc::now().timestamp() as f64;
    let vectors = vector.map(|v| vec![v]);
    store.replace_note(path, &[rec], vectors.as_deref()).unwrap();
}

/// Run a lite-mode (no embedding) index pass over the vault.
pub fn index_vault(store: &Store, config: &SameConfig) -> IndexReport {
    let cancel = Arc::new(AtomicBool::new(false));
    Indexer::new(store, None, config, cancel).run(false).unwrap()
}

/// Run a full-mode index pass with the given provider.
pub fn index_vault_with(
    store: &Store,
    config: &SameConfig,
    provider: &dyn EmbeddingProvider,
) -> IndexReport {
    let cancel = Arc::new(AtomicBool::new(false));
    Indexer::new(store, Some(provider), config, cancel)
        .run(false)
        .unwrap()
}

/// Deterministic provider: the vector depends only on the text bytes, so
/// reindex runs are bit-for-bit reproducible.
pub struct HashProvider;

impl EmbeddingProvider for HashProvider {
    fn embed(&self, text: &str, _role: EmbedRole) -> anyhow::Result<Vec<f32>> {
        let mut v = vec![0.0f32; DIM];
        for (i, b) in text.bytes().enumerate() {
            v[i % DIM] += b as f32 / 255.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn model_name(&self) -> &str {
        "hash-test"
    }

    fn dims(&self) -> usize {
        DIM
    }
}

/// Provider whose vectors are far from everything [`HashProvider`] and
/// [`spike`] produce — every query misses the distance gate.
pub struct FarProvider;

impl EmbeddingProvider for FarProvider {
    fn embed(&self, _text: &str, _role: EmbedRole) -> anyhow::Result<Vec<f32>> {
        Ok(vec![100.0f32; DIM])
    }

    fn model_name(&self) -> &str {
        "far-test"
    }

    fn dims(&self) -> usize {
        DIM
    }
}
