//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and two concrete backends:
//!
//! - **[`ollama::OllamaProvider`]** — a local Ollama-style `/api/embeddings`
//!   endpoint; the host is gated to localhost at construction.
//! - **[`openai::OpenAiProvider`]** — any OpenAI-compatible `/v1/embeddings`
//!   API; requires an API key and warns once on first use.
//!
//! A third state, *disabled*, is the absence of a provider:
//! [`create_provider`] returns `None` and callers fall back to keyword-only
//! retrieval.
//!
//! All methods are synchronous — callers in async contexts should use
//! `tokio::task::spawn_blocking`.
//!
//! Also provides vector utilities for sqlite-vec BLOB storage:
//! [`vec_to_blob`], [`blob_to_vec`], and [`cosine_similarity`].

pub mod ollama;
pub mod openai;

use anyhow::{bail, Result};

use crate::config::EmbeddingConfig;

/// Whether a text is being embedded for indexing or for querying. The role
/// is prepended to the text as a short prefix before transport, so the same
/// model distinguishes index-time from query-time inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedRole {
    Document,
    Query,
}

impl EmbedRole {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Document => "search_document",
            Self::Query => "search_query",
        }
    }

    /// The wire form sent to the model: `<prefix>: <text>`.
    pub fn apply(&self, text: &str) -> String {
        format!("{}: {}", self.prefix(), text)
    }
}

/// Trait for embedding text into fixed-dimension vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text with the given role.
    fn embed(&self, text: &str, role: EmbedRole) -> Result<Vec<f32>>;

    /// Model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality this provider produces.
    fn dims(&self) -> usize;
}

/// Input length above which a 500-class response triggers one retry with
/// the text truncated to half length (the usual cause is context overflow).
pub const TRUNCATE_RETRY_THRESHOLD: usize = 3_000;

/// Per-request timeout for embedding calls.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Create the configured provider, or `None` when embeddings are disabled
/// and callers should fall back to keyword-only retrieval.
///
/// Provider selection: `ollama` (and `auto`, which defaults to the local
/// endpoint), `openai` / `openai-compatible`, or `none`. Construction
/// failures are hard errors — there is no dynamic reload.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Option<Box<dyn EmbeddingProvider>>> {
    match config.provider.trim().to_lowercase().as_str() {
        "" | "auto" | "ollama" => {
            let provider = ollama::OllamaProvider::new(config)?;
            Ok(Some(Box::new(provider)))
        }
        "openai" | "openai-compatible" => {
            let provider = openai::OpenAiProvider::new(config)?;
            Ok(Some(Box::new(provider)))
        }
        "none" => Ok(None),
        other => bail!(
            "unknown embedding provider: {other}. Supported: ollama, openai, openai-compatible, none, auto"
        ),
    }
}

/// Encode a float vector as a sqlite-vec BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a sqlite-vec BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors, `0.0` for mismatched or empty
/// inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Truncate oversized input to half length on a char boundary for the
/// one-shot retry after a 500-class response.
pub(crate) fn truncate_half(text: &str) -> &str {
    let mut cut = text.len() / 2;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

/// Redact an API key from error text before it can reach logs or clients.
pub(crate) fn redact_key(body: &str, api_key: &str) -> String {
    if api_key.is_empty() {
        return body.to_string();
    }
    body.replace(api_key, "[redacted]")
}
