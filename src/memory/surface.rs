//! Context surfacing: prompt → sanitized, token-budgeted context bundle.
//!
//! A prompt passes a series of gates (length, slash command, conversational
//! filler, specificity) before anything is retrieved. Standard retrieval is
//! vector-first with strict distance and composite gates; when the prompt
//! has recency intent, retrieval shifts to recency-heavy weights and merges
//! in the most recently modified notes even without a semantic match.
//! Every snippet is sanitized against prompt-injection patterns before it
//! can reach the agent.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{scoring, terms};
use crate::embedding::{EmbedRole, EmbeddingProvider};
use crate::store::search::RawHit;
use crate::store::{ContentType, NoteRecord, Store};

const MIN_PROMPT_CHARS: usize = 20;
const MAX_SNIPPET_CHARS: usize = 300;
// Two high-quality results beat three noisy ones.
const MAX_RESULTS: usize = 2;
// L2 distance (not squared); good queries land < 16.3, off-topic > 16.8.
const MAX_DISTANCE: f64 = 16.5;
const MIN_COMPOSITE: f64 = 0.65;
// Absolute floor: below this semantic score, no boost can save a result.
const MIN_SEMANTIC_FLOOR: f64 = 0.25;
const MAX_TOKEN_BUDGET: usize = 800;

// Recency mode: weights shift heavily to recency, the composite threshold
// drops (semantic score may be weak), and the distance gate relaxes.
const RECENCY_MAX_RESULTS: usize = 3;
const RECENCY_MIN_COMPOSITE: f64 = 0.45;
const RECENCY_DISTANCE_SLACK: f64 = 2.0;

/// Placeholder that replaces any snippet matching an injection pattern.
pub const FILTERED_PLACEHOLDER: &str = "[content filtered for security]";

/// Prompt-injection leaders. A snippet containing any of these is replaced
/// wholesale with [`FILTERED_PLACEHOLDER`].
const INJECTION_PATTERNS: &[&str] = &[
    "ignore previous",
    "ignore all previous",
    "ignore above",
    "disregard previous",
    "disregard all previous",
    "you are now",
    "new instructions",
    "system prompt",
    "<system>",
    "</system>",
    "important:",
    "critical:",
    "override",
    "[inst]",
    "<<sys>>",
    "<![cdata[",
];

/// Content types that sort ahead of others at equal composite score.
fn is_priority_type(content_type: ContentType) -> bool {
    matches!(
        content_type,
        ContentType::Handoff | ContentType::Decision | ContentType::Research | ContentType::Hub
    )
}

/// Vocabulary of courtesy/acknowledgement words. A prompt made up
/// entirely of these carries no retrieval intent.
const CONVERSATIONAL_WORDS: &[&str] = &[
    "hi", "hey", "hello", "howdy", "thanks", "thank", "thx", "you", "ok", "okay", "yes", "no",
    "yep", "nope", "sure", "cool", "great", "nice", "perfect", "awesome", "sounds", "good",
    "fine", "lgtm", "got", "it", "will", "do", "makes", "sense", "please", "then", "that",
    "works", "bye",
];

fn is_conversational(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    let mut saw_token = false;
    for token in lower.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        saw_token = true;
        if !CONVERSATIONAL_WORDS.contains(&token) {
            return false;
        }
    }
    saw_token
}

static ACRONYM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]{2,}").unwrap());
static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""[^"]+"|'[^']{3,}'"#).unwrap());

static SURFACER_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(vault-context|vault-handoff|vault-decisions|session-context)>").unwrap()
});

/// A surfaced context bundle.
#[derive(Debug)]
pub struct SurfacedContext {
    pub context: String,
    pub injected_paths: Vec<String>,
    pub estimated_tokens: usize,
}

#[derive(Debug, Clone)]
struct Scored {
    path: String,
    title: String,
    content_type: ContentType,
    snippet: String,
    composite: f64,
}

/// Run the full surfacing pipeline for a prompt. Returns `None` whenever
/// nothing should be injected — every failure path degrades to silence.
pub fn surface_context(
    store: &Store,
    provider: Option<&dyn EmbeddingProvider>,
    prompt: &str,
    session_id: &str,
    hook_name: &str,
) -> Option<SurfacedContext> {
    if !passes_gates(prompt) {
        return None;
    }

    let key_terms = terms::extract_terms(prompt);
    let is_recency = scoring::has_recency_intent(prompt);
    let now = chrono::Utc::now().timestamp() as f64;

    let mut candidates = match provider {
        Some(provider) => {
            let query_vec = match provider.embed(prompt, EmbedRole::Query) {
                Ok(v) => v,
                Err(err) => {
                    tracing::debug!(error = %err, "prompt embedding failed, no context");
                    return None;
                }
            };
            if is_recency {
                recency_hybrid_search(store, &query_vec, &key_terms, now)
            } else {
                standard_search(store, &query_vec, &key_terms, now)
            }
        }
        // No embedding provider: keyword-only fallback through FTS.
        None => keyword_fallback(store, &key_terms, is_recency, now),
    };

    // Pinned notes surface unconditionally, ahead of scored results.
    let mut entries = pinned_entries(store, &key_terms);
    let pinned_paths: std::collections::HashSet<String> =
        entries.iter().map(|e| e.path.clone()).collect();
    candidates.retain(|c| !pinned_paths.contains(&c.path));

    let max_results = if is_recency {
        RECENCY_MAX_RESULTS
    } else {
        MAX_RESULTS
    };
    candidates.truncate(max_results);
    entries.extend(candidates);

    if entries.is_empty() {
        return None;
    }

    // Token-budgeted assembly: a whole entry is dropped rather than
    // truncated.
    let mut parts = Vec::new();
    let mut injected_paths = Vec::new();
    let mut total_tokens = 0usize;
    for entry in &entries {
        let text = format!(
            "**{}** ({}, score: {:.3})\n{}\n{}",
            entry.title,
            entry.content_type.as_str(),
            entry.composite,
            entry.path,
            entry.snippet
        );
        let entry_tokens = terms::estimate_tokens(&text);
        if total_tokens + entry_tokens > MAX_TOKEN_BUDGET {
            break;
        }
        total_tokens += entry_tokens;
        parts.push(text);
        injected_paths.push(entry.path.clone());
    }

    if parts.is_empty() {
        return None;
    }

    let context = format!(
        "\n<vault-context>\nRelevant vault notes for this prompt:\n\n{}\n</vault-context>\n",
        parts.join("\n---\n")
    );

    if !session_id.is_empty() {
        if let Err(err) = store.log_injection(session_id, hook_name, &injected_paths, total_tokens)
        {
            tracing::debug!(error = %err, "usage logging failed");
        }
    }
    let path_refs: Vec<&str> = injected_paths.iter().map(String::as_str).collect();
    if let Err(err) = store.bump_access(&path_refs) {
        tracing::debug!(error = %err, "access tracking failed");
    }

    Some(SurfacedContext {
        context,
        injected_paths,
        estimated_tokens: total_tokens,
    })
}

/// All gates a prompt must pass before any retrieval runs.
fn passes_gates(prompt: &str) -> bool {
    let trimmed = prompt.trim();
    if prompt.len() < MIN_PROMPT_CHARS {
        return false;
    }
    // Slash commands are agent-directed, not questions for the vault.
    if trimmed.starts_with('/') {
        return false;
    }
    if is_conversational(trimmed) {
        return false;
    }
    has_specific_signal(trimmed)
}

/// A prompt must carry at least one specific signal: an acronym, a quoted
/// phrase, or two non-stopword terms.
fn has_specific_signal(prompt: &str) -> bool {
    if ACRONYM.is_match(prompt) {
        return true;
    }
    if QUOTED.is_match(prompt) {
        return true;
    }
    terms::extract_terms(prompt).len() >= 2
}

/// Standard retrieval: strict distance gate, semantic floor, standard
/// weights, priority-type sort.
fn standard_search(
    store: &Store,
    query_vec: &[f32],
    key_terms: &[String],
    now: f64,
) -> Vec<Scored> {
    let raw = match store.vector_search_raw(query_vec, MAX_RESULTS * 6) {
        Ok(raw) if !raw.is_empty() => raw,
        _ => return Vec::new(),
    };
    if raw[0].distance > MAX_DISTANCE {
        return Vec::new();
    }

    let deduped = dedup_by_path(raw);
    let (min_dist, max_dist) = distance_range(&deduped);
    let range = if max_dist - min_dist > 0.0 {
        max_dist - min_dist
    } else {
        1.0
    };

    let (w_rel, w_rec, w_conf) = scoring::STANDARD_WEIGHTS;
    let mut candidates = Vec::new();
    for hit in &deduped {
        if hit.distance > MAX_DISTANCE {
            continue;
        }
        let semantic = 1.0 - (hit.distance - min_dist) / range;
        if semantic < MIN_SEMANTIC_FLOOR {
            continue;
        }
        let composite = scoring::composite_score(
            semantic,
            hit.note.modified,
            hit.note.confidence,
            hit.note.content_type,
            w_rel,
            w_rec,
            w_conf,
            now,
        );
        if composite < MIN_COMPOSITE {
            continue;
        }
        candidates.push(make_scored(&hit.note, composite, key_terms));
    }

    sort_candidates(&mut candidates);
    terms::collapse_near_duplicates(candidates, |c| &c.path)
}

/// Recency-hybrid retrieval: vector results under relaxed gates merged
/// with the most recently modified notes; recent-only candidates score
/// with semantic 0.
fn recency_hybrid_search(
    store: &Store,
    query_vec: &[f32],
    key_terms: &[String],
    now: f64,
) -> Vec<Scored> {
    let (w_rel, w_rec, w_conf) = scoring::RECENCY_WEIGHTS;
    let mut by_path: HashMap<String, Scored> = HashMap::new();

    if let Ok(raw) = store.vector_search_raw(query_vec, RECENCY_MAX_RESULTS * 6) {
        if !raw.is_empty() {
            let deduped = dedup_by_path(raw);
            let (min_dist, max_dist) = distance_range(&deduped);
            let range = if max_dist - min_dist > 0.0 {
                max_dist - min_dist
            } else {
                1.0
            };
            for hit in &deduped {
                if hit.distance > MAX_DISTANCE + RECENCY_DISTANCE_SLACK {
                    continue;
                }
                let semantic = (1.0 - (hit.distance - min_dist) / range).max(0.0);
                let composite = scoring::composite_score(
                    semantic,
                    hit.note.modified,
                    hit.note.confidence,
                    hit.note.content_type,
                    w_rel,
                    w_rec,
                    w_conf,
                    now,
                );
                if composite >= RECENCY_MIN_COMPOSITE {
                    by_path.insert(hit.note.path.clone(), make_scored(&hit.note, composite, key_terms));
                }
            }
        }
    }

    if let Ok(recent) = store.recent_notes(RECENCY_MAX_RESULTS * 3) {
        for note in &recent {
            if by_path.contains_key(&note.path) {
                continue; // vector result already carries a score
            }
            let composite = scoring::composite_score(
                0.0,
                note.modified,
                note.confidence,
                note.content_type,
                w_rel,
                w_rec,
                w_conf,
                now,
            );
            if composite >= RECENCY_MIN_COMPOSITE {
                by_path.insert(note.path.clone(), make_scored(note, composite, key_terms));
            }
        }
    }

    let mut candidates: Vec<Scored> = by_path.into_values().collect();
    candidates.sort_by(|a, b| {
        b.composite
            .partial_cmp(&a.composite)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    terms::collapse_near_duplicates(candidates, |c| &c.path)
}

/// FTS-backed fallback when no embedding provider is configured: the FTS
/// score stands in for semantic similarity.
fn keyword_fallback(store: &Store, key_terms: &[String], is_recency: bool, now: f64) -> Vec<Scored> {
    let limit = if is_recency {
        RECENCY_MAX_RESULTS
    } else {
        MAX_RESULTS
    } * 3;
    let hits = match store.fts_search(key_terms, limit) {
        Ok(hits) => hits,
        Err(_) => return Vec::new(),
    };

    let (w_rel, w_rec, w_conf) = if is_recency {
        scoring::RECENCY_WEIGHTS
    } else {
        scoring::STANDARD_WEIGHTS
    };
    let min_composite = if is_recency {
        RECENCY_MIN_COMPOSITE
    } else {
        MIN_COMPOSITE
    };

    let mut candidates = Vec::new();
    for hit in &hits {
        let content_type: ContentType = hit.content_type.parse().unwrap_or(ContentType::Note);
        let note = match store.get_note(&hit.path) {
            Ok(chunks) if !chunks.is_empty() => chunks.into_iter().next().unwrap(),
            _ => continue,
        };
        let composite = scoring::composite_score(
            hit.score,
            note.modified,
            note.confidence,
            content_type,
            w_rel,
            w_rec,
            w_conf,
            now,
        );
        if composite < min_composite {
            continue;
        }
        candidates.push(make_scored(&note, composite, key_terms));
    }

    sort_candidates(&mut candidates);
    terms::collapse_near_duplicates(candidates, |c| &c.path)
}

/// Pinned notes as ready entries, before any scored candidate.
fn pinned_entries(store: &Store, key_terms: &[String]) -> Vec<Scored> {
    match store.pinned_notes() {
        Ok(notes) => notes
            .iter()
            .map(|note| make_scored(note, 1.0, key_terms))
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Priority content types first, then composite descending.
fn sort_candidates(candidates: &mut [Scored]) {
    candidates.sort_by(|a, b| {
        let a_pri = is_priority_type(a.content_type);
        let b_pri = is_priority_type(b.content_type);
        b_pri
            .cmp(&a_pri)
            .then_with(|| {
                b.composite
                    .partial_cmp(&a.composite)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
}

fn dedup_by_path(raw: Vec<RawHit>) -> Vec<RawHit> {
    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .filter(|hit| seen.insert(hit.note.path.clone()))
        .collect()
}

fn distance_range(hits: &[RawHit]) -> (f64, f64) {
    let min = hits.iter().map(|h| h.distance).fold(f64::INFINITY, f64::min);
    let max = hits
        .iter()
        .map(|h| h.distance)
        .fold(f64::NEG_INFINITY, f64::max);
    (min, max)
}

fn make_scored(note: &NoteRecord, composite: f64, key_terms: &[String]) -> Scored {
    Scored {
        path: note.path.clone(),
        title: note.title.clone(),
        content_type: note.content_type,
        snippet: sanitize_snippet(&build_snippet(&note.text, key_terms)),
        composite,
    }
}

/// Build a query-biased snippet: leading heading lines stripped, window
/// centered on the first paragraph containing a key term (opening
/// otherwise), truncated at the sentence boundary nearest 300 chars — or a
/// paragraph boundary when one is nearer.
pub fn build_snippet(text: &str, key_terms: &[String]) -> String {
    let mut body = text;
    while let Some(rest) = strip_leading_heading(body) {
        body = rest;
    }
    let body = body.trim_start();

    // Query-biased window: jump to the first paragraph mentioning a term.
    let window = if key_terms.is_empty() {
        body
    } else {
        let mut start = 0usize;
        let mut offset = 0usize;
        for para in body.split_inclusive("\n\n") {
            let lower = para.to_lowercase();
            if key_terms.iter().any(|t| lower.contains(t.as_str())) {
                start = offset;
                break;
            }
            offset += para.len();
        }
        &body[start..]
    };

    let window = window.trim();
    if window.len() <= MAX_SNIPPET_CHARS {
        return window.to_string();
    }

    let head = &window[..crate::store::search::floor_char_boundary(window, MAX_SNIPPET_CHARS)];

    // Prefer the boundary closest to the cap: paragraph if nearer, else
    // sentence, else hard cut.
    let para_cut = head.rfind("\n\n");
    let sentence_cut = ['.', '!', '?']
        .iter()
        .filter_map(|p| head.rfind(*p))
        .max()
        .map(|i| i + 1);

    let cut = match (para_cut, sentence_cut) {
        (Some(p), Some(s)) => p.max(s),
        (Some(p), None) => p,
        (None, Some(s)) => s,
        (None, None) => head.len(),
    };
    head[..cut].trim_end().to_string()
}

fn strip_leading_heading(body: &str) -> Option<&str> {
    let trimmed = body.trim_start_matches(['\n', '\r']);
    if trimmed.starts_with('#') {
        match trimmed.split_once('\n') {
            Some((_, rest)) => Some(rest),
            None => Some(""),
        }
    } else {
        None
    }
}

/// Replace any snippet containing a known injection leader with the fixed
/// placeholder, then neutralize the surfacer's own structural tags.
pub fn sanitize_snippet(text: &str) -> String {
    let lower = text.to_lowercase();
    for pattern in INJECTION_PATTERNS {
        if lower.contains(pattern) {
            return FILTERED_PLACEHOLDER.to_string();
        }
    }
    SURFACER_TAGS
        .replace_all(text, |caps: &regex::Captures<'_>| {
            caps[0].replace('<', "[").replace('>', "]")
        })
        .into_owned()
}
