//! Retrieval and context engine — scoring, term extraction, surfacing,
//! transcript parsing, decision extraction, handoffs, and staleness.
//!
//! The write side lives in [`crate::store`] and [`crate::indexer`]; this
//! module owns everything between a raw prompt and the sanitized context
//! bundle that reaches the agent.

pub mod decisions;
pub mod handoff;
pub mod scoring;
pub mod staleness;
pub mod surface;
pub mod terms;
pub mod transcript;
