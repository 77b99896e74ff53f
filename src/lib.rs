//! SAME — a local-first memory engine for AI coding agents.
//!
//! SAME indexes a directory tree of markdown notes (a *vault*) into SQLite
//! augmented with [sqlite-vec](https://github.com/asg017/sqlite-vec) dense
//! vectors, then serves query-relevant context back to agents through a
//! stdio tool server and a small set of session-lifecycle hooks.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with FTS5 for keyword search and sqlite-vec for
//!   KNN vector search, one row per note chunk
//! - **Embeddings**: pluggable HTTP providers (Ollama-style local endpoint
//!   or any OpenAI-compatible `/v1/embeddings` API), or none at all —
//!   keyword search keeps working without vectors
//! - **Retrieval**: vector KNN fused with content-type-aware recency decay
//!   and confidence weighting into a single composite score
//! - **Surfacing**: prompt-gated, injection-sanitized, token-budgeted
//!   context bundles injected at session-lifecycle events
//!
//! # Modules
//!
//! - [`config`] — vault resolution, environment overrides, vault registry
//! - [`db`] — SQLite initialization, schema, and migrations
//! - [`store`] — note rows, vectors, search, pins, sessions, usage
//! - [`embedding`] — text-to-vector providers
//! - [`indexer`] — vault walking, chunking, incremental reindex
//! - [`memory`] — scoring, term extraction, context surfacing, transcripts
//! - [`hooks`] — session-lifecycle handlers
//! - [`server`] — line-JSON tool server over stdio

pub mod config;
pub mod db;
pub mod embedding;
pub mod hooks;
pub mod indexer;
pub mod memory;
pub mod server;
pub mod store;
