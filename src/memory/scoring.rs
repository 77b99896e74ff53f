//! Composite relevance scoring.
//!
//! A retrieval candidate's final score fuses three signals: semantic
//! similarity from the vector search, a content-type-aware recency decay,
//! and the note's confidence. Weights are policy constants here so tuning
//! affects every call site at once; callers may still pass overrides.

use std::sync::LazyLock;

use regex::Regex;

use crate::store::ContentType;

/// Default weights (relevance, recency, confidence) for standard retrieval.
pub const STANDARD_WEIGHTS: (f64, f64, f64) = (0.3, 0.3, 0.4);

/// Weights when the query has recency intent: shifted heavily to recency.
pub const RECENCY_WEIGHTS: (f64, f64, f64) = (0.1, 0.7, 0.2);

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Recency half-life in days per content type. Decisions and hubs never
/// decay — a year-old decision is as binding as a fresh one.
fn half_life_days(content_type: ContentType) -> Option<f64> {
    match content_type {
        ContentType::Note => Some(60.0),
        ContentType::Project => Some(90.0),
        ContentType::Research => Some(180.0),
        ContentType::Handoff => Some(14.0),
        ContentType::Decision | ContentType::Hub => None,
    }
}

/// Exponential recency decay clamped to `[0, 1]`: 0.5 at one half-life,
/// 1.0 for types that never decay.
pub fn recency_score(modified_epoch: f64, content_type: ContentType, now_epoch: f64) -> f64 {
    let Some(half_life) = half_life_days(content_type) else {
        return 1.0;
    };
    let age_days = ((now_epoch - modified_epoch) / SECONDS_PER_DAY).max(0.0);
    0.5_f64.powf(age_days / half_life).clamp(0.0, 1.0)
}

/// Weighted fusion of semantic similarity, recency, and confidence.
/// With weights summing to 1 and each component in `[0, 1]`, the result is
/// in `[0, 1]`.
pub fn composite_score(
    semantic: f64,
    modified_epoch: f64,
    confidence: f64,
    content_type: ContentType,
    w_rel: f64,
    w_rec: f64,
    w_conf: f64,
    now_epoch: f64,
) -> f64 {
    w_rel * semantic
        + w_rec * recency_score(modified_epoch, content_type, now_epoch)
        + w_conf * confidence
}

/// Compute a confidence score for a note that did not declare one.
///
/// Base by content type, plus a bounded access-count boost and a flat
/// review-discipline boost, clamped to `[0, 1]`.
pub fn compute_confidence(
    content_type: ContentType,
    access_count: i64,
    has_review_by: bool,
) -> f64 {
    let base = match content_type {
        ContentType::Decision => 0.8,
        ContentType::Hub => 0.75,
        ContentType::Research => 0.65,
        ContentType::Handoff => 0.6,
        ContentType::Project => 0.55,
        ContentType::Note => 0.5,
    };
    let access_boost = ((access_count as f64 + 1.0).ln() / 50.0).min(0.1);
    let review_boost = if has_review_by { 0.1 } else { 0.0 };
    (base + access_boost + review_boost).clamp(0.0, 1.0)
}

static RECENCY_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(recent|recently|latest|this week|yesterday|today|last session|what changed|updated|what did i work on)\b",
    )
    .unwrap()
});

/// True if the query signals recency intent ("what did I work on
/// recently", "latest notes", ...). Matching is case-insensitive on word
/// boundaries.
pub fn has_recency_intent(query: &str) -> bool {
    RECENCY_PHRASES.is_match(query)
}

/// Infer a content type when frontmatter omits it. An explicit type or a
/// matching tag overrides the path heuristic.
pub fn infer_content_type(path: &str, explicit: Option<&str>, tags: &[String]) -> ContentType {
    if let Some(t) = explicit {
        if let Ok(ct) = t.parse() {
            return ct;
        }
    }
    for tag in tags {
        if let Ok(ct) = tag.to_lowercase().parse() {
            return ct;
        }
    }

    let lower = path.to_lowercase();
    let components: Vec<&str> = lower.split('/').collect();
    let filename = components.last().copied().unwrap_or("");

    if components.iter().any(|c| c.contains("session") || c.contains("handoff")) {
        return ContentType::Handoff;
    }
    if filename.contains("decision") {
        return ContentType::Decision;
    }
    if crate::indexer::walker::has_private_component(path) {
        return ContentType::Research;
    }
    if components[..components.len().saturating_sub(1)]
        .iter()
        .any(|c| c.contains("project"))
    {
        return ContentType::Project;
    }
    if components[..components.len().saturating_sub(1)]
        .iter()
        .any(|c| c.contains("resource") || c.contains("hub"))
    {
        return ContentType::Hub;
    }
    ContentType::Note
}
