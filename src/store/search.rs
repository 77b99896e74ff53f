//! Vector KNN, FTS5, and LIKE-fallback search over the note table.
//!
//! All public entry points append the private-path filter; a private row
//! that somehow survived indexing is filtered here and logged.

use anyhow::{Context, Result};
use rusqlite::params;

use super::{note_from_row, NoteRecord, Store, NOTE_COLUMNS, PRIVATE_FILTER};
use crate::config::MAX_SNIPPET_LENGTH;
use crate::embedding::vec_to_blob;

/// A raw KNN hit: full note metadata plus the L2 distance.
#[derive(Debug, Clone)]
pub struct RawHit {
    pub note: NoteRecord,
    pub distance: f64,
}

/// A normalized, presentation-ready search result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub path: String,
    pub title: String,
    pub chunk_heading: String,
    pub score: f64,
    pub distance: f64,
    pub snippet: String,
    pub domain: String,
    pub workstream: String,
    pub tags: Vec<String>,
    pub content_type: String,
    pub confidence: f64,
}

/// Metadata filters for the normalized vector search.
#[derive(Debug, Default, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub domain: Option<String>,
    pub workstream: Option<String>,
    /// OR semantics, case-insensitive.
    pub tags: Vec<String>,
}

impl Store {
    /// Raw KNN: rows ordered by ascending distance, no normalization, no
    /// dedup. `fetch_k` is taken as-is.
    pub fn vector_search_raw(&self, query: &[f32], fetch_k: usize) -> Result<Vec<RawHit>> {
        if query.len() != self.dim() {
            anyhow::bail!(
                "query vector dimension {} != configured {}",
                query.len(),
                self.dim()
            );
        }
        let conn = self.lock();
        let sql = format!(
            "SELECT {NOTE_COLUMNS}, v.distance
             FROM (SELECT note_id, distance FROM vault_notes_vec
                   WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2) v
             JOIN vault_notes n ON n.id = v.note_id
             WHERE 1=1{PRIVATE_FILTER}
             ORDER BY v.distance"
        );
        let mut stmt = conn.prepare(&sql)?;
        let hits = stmt
            .query_map(params![vec_to_blob(query), fetch_k as i64], |row| {
                Ok(RawHit {
                    note: note_from_row(row)?,
                    distance: row.get(16)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("vector search")?;
        Ok(hits)
    }

    /// Normalized top-k vector search: over-fetch 5×, apply metadata
    /// filters, deduplicate by path keeping the lowest-distance chunk, clamp
    /// to `top_k`, then min-max normalize distances into scores.
    pub fn vector_search(&self, query: &[f32], opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        let top_k = opts.top_k.clamp(1, 100);
        let raw = self.vector_search_raw(query, top_k * 5)?;

        let filtered: Vec<RawHit> = raw
            .into_iter()
            .filter(|hit| matches_filters(&hit.note, opts))
            .collect();

        // Dedup by path, keeping the first (lowest-distance) chunk.
        let mut seen = std::collections::HashSet::new();
        let mut deduped: Vec<RawHit> = Vec::new();
        for hit in filtered {
            if seen.insert(hit.note.path.clone()) {
                deduped.push(hit);
                if deduped.len() >= top_k {
                    break;
                }
            }
        }

        Ok(normalize_hits(&deduped))
    }

    /// FTS5 search. Terms are escaped and OR-joined; an empty term list
    /// returns empty rather than erroring. Results deduplicate by path,
    /// best rank first.
    pub fn fts_search(&self, terms: &[String], limit: usize) -> Result<Vec<SearchHit>> {
        let query = build_fts_query(terms);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock();
        let sql = format!(
            "SELECT {NOTE_COLUMNS}, f.rank
             FROM vault_notes_fts f
             JOIN vault_notes n ON n.id = f.note_id
             WHERE f.vault_notes_fts MATCH ?1{PRIVATE_FILTER}
             ORDER BY f.rank
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![query, (limit.max(1) * 5) as i64], |row| {
                let note = note_from_row(row)?;
                let rank: f64 = row.get(16)?;
                Ok((note, rank))
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("fts search")?;

        let mut seen = std::collections::HashSet::new();
        let mut hits = Vec::new();
        for (note, _rank) in rows {
            if seen.insert(note.path.clone()) {
                hits.push(note);
                if hits.len() >= limit.max(1) {
                    break;
                }
            }
        }

        // FTS rank has no meaningful absolute scale; score by position.
        let total = hits.len();
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, note)| to_hit(&note, 1.0 - i as f64 / total.max(1) as f64, 0.0))
            .collect())
    }

    /// LIKE-based keyword fallback for stores indexed without an embedding
    /// provider. OR semantics across terms; rows ranked by how many terms
    /// matched, title matches counting double.
    pub fn keyword_search(&self, terms: &[String], limit: usize) -> Result<Vec<SearchHit>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut clauses = Vec::new();
        let mut params_vec: Vec<String> = Vec::new();
        for term in terms {
            let pattern = format!("%{}%", escape_like(term));
            clauses.push(
                "(n.text LIKE ? ESCAPE '\\' OR n.title LIKE ? ESCAPE '\\')".to_string(),
            );
            params_vec.push(pattern.clone());
            params_vec.push(pattern);
        }

        let conn = self.lock();
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM vault_notes n
             WHERE ({}){PRIVATE_FILTER}
             LIMIT 500",
            clauses.join(" OR ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> = params_vec
            .iter()
            .map(|p| p as &dyn rusqlite::types::ToSql)
            .collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), note_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("keyword search")?;

        // Score in memory: matched terms, title hits weighted double.
        let mut scored: Vec<(NoteRecord, f64)> = rows
            .into_iter()
            .map(|note| {
                let text_lower = note.text.to_lowercase();
                let title_lower = note.title.to_lowercase();
                let mut hits = 0usize;
                for term in terms {
                    let t = term.to_lowercase();
                    if title_lower.contains(&t) {
                        hits += 2;
                    } else if text_lower.contains(&t) {
                        hits += 1;
                    }
                }
                let score = hits as f64 / (terms.len() * 2) as f64;
                (note, score.min(1.0))
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (note, score) in scored {
            if seen.insert(note.path.clone()) {
                out.push(to_hit(&note, score, 0.0));
                if out.len() >= limit.max(1) {
                    break;
                }
            }
        }
        Ok(out)
    }
}

fn matches_filters(note: &NoteRecord, opts: &SearchOptions) -> bool {
    if let Some(domain) = &opts.domain {
        if !note.domain.eq_ignore_ascii_case(domain) {
            return false;
        }
    }
    if let Some(workstream) = &opts.workstream {
        if !note.workstream.eq_ignore_ascii_case(workstream) {
            return false;
        }
    }
    if !opts.tags.is_empty() {
        let note_tags: Vec<String> = note.tags.iter().map(|t| t.to_lowercase()).collect();
        let any = opts
            .tags
            .iter()
            .any(|req| note_tags.contains(&req.to_lowercase()));
        if !any {
            return false;
        }
    }
    true
}

/// Min-max normalize distances into `[0, 1]` scores across the result set.
/// A degenerate range (single result or identical distances) scores 0 per
/// the normalization contract.
fn normalize_hits(hits: &[RawHit]) -> Vec<SearchHit> {
    if hits.is_empty() {
        return Vec::new();
    }
    let min = hits
        .iter()
        .map(|h| h.distance)
        .fold(f64::INFINITY, f64::min);
    let max = hits
        .iter()
        .map(|h| h.distance)
        .fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    hits.iter()
        .map(|h| {
            let score = if range > 0.0 {
                1.0 - (h.distance - min) / range
            } else {
                0.0
            };
            to_hit(&h.note, score, h.distance)
        })
        .collect()
}

fn to_hit(note: &NoteRecord, score: f64, distance: f64) -> SearchHit {
    let mut snippet = note.text.clone();
    if snippet.len() > MAX_SNIPPET_LENGTH {
        let cut = floor_char_boundary(&snippet, MAX_SNIPPET_LENGTH);
        snippet.truncate(cut);
    }
    SearchHit {
        path: note.path.clone(),
        title: note.title.clone(),
        chunk_heading: note.chunk_heading.clone(),
        score: round3(score),
        distance: round1(distance),
        snippet,
        domain: note.domain.clone(),
        workstream: note.workstream.clone(),
        tags: note.tags.clone(),
        content_type: note.content_type.as_str().to_string(),
        confidence: round3(note.confidence),
    }
}

pub(crate) fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut cut = max;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

/// Build an FTS5 MATCH expression: operators stripped from each term, the
/// remainder quoted, terms OR-joined. Empty after stripping → empty query.
fn build_fts_query(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| escape_fts_term(t))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Strip the FTS5 operator set from a term.
fn escape_fts_term(term: &str) -> String {
    term.chars()
        .filter(|c| !matches!(c, '*' | '^' | '-' | '"' | '{' | '}' | '(' | ')'))
        .collect()
}

/// Escape LIKE wildcards with backslash.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn round3(f: f64) -> f64 {
    (f * 1000.0).round() / 1000.0
}

fn round1(f: f64) -> f64 {
    (f * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ContentType;

    fn test_store() -> Store {
        Store::open_in_memory(8).unwrap()
    }

    fn insert(store: &Store, path: &str, text: &str, vector: Option<Vec<f32>>) {
        let mut rec = NoteRecord::new(path, path.trim_end_matches(".md"), 0, "(full)", text);
        rec.content_hash = format!("hash-{path}");
        rec.modified = 1_700_000_000.0;
        let vectors = vector.map(|v| vec![v]);
        store.replace_note(path, &[rec], vectors.as_deref()).unwrap();
    }

    fn spike(seed: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 8];
        v[seed % 8] = 1.0;
        v
    }

    #[test]
    fn vector_search_orders_by_distance() {
        let store = test_store();
        insert(&store, "near.md", "close match", Some(spike(0)));
        insert(&store, "far.md", "distant", Some(spike(4)));

        let hits = store.vector_search_raw(&spike(0), 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].note.path, "near.md");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[test]
    fn vector_search_raw_excludes_private() {
        let store = test_store();
        insert(&store, "ok.md", "public", Some(spike(0)));
        insert(&store, "_PRIVATE/secret.md", "private", Some(spike(0)));

        let hits = store.vector_search_raw(&spike(0), 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].note.path, "ok.md");
    }

    #[test]
    fn normalized_search_dedups_by_path() {
        let store = test_store();
        let mut root = NoteRecord::new("multi.md", "Multi", 0, "(intro)", "intro text");
        root.content_hash = "h".into();
        let mut second = NoteRecord::new("multi.md", "Multi", 1, "Details", "detail text");
        second.content_hash = "h".into();
        store
            .replace_note("multi.md", &[root, second], Some(&[spike(0), spike(1)]))
            .unwrap();
        insert(&store, "other.md", "other", Some(spike(2)));

        let opts = SearchOptions {
            top_k: 10,
            ..Default::default()
        };
        let hits = store.vector_search(&spike(0), &opts).unwrap();
        let multi_count = hits.iter().filter(|h| h.path == "multi.md").count();
        assert_eq!(multi_count, 1);
    }

    #[test]
    fn normalized_scores_span_zero_to_one() {
        let store = test_store();
        insert(&store, "a.md", "a", Some(spike(0)));
        insert(&store, "b.md", "b", Some(spike(3)));
        insert(&store, "c.md", "c", Some(spike(6)));

        let opts = SearchOptions {
            top_k: 10,
            ..Default::default()
        };
        let hits = store.vector_search(&spike(0), &opts).unwrap();
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits.last().unwrap().score, 0.0);
        for h in &hits {
            assert!((0.0..=1.0).contains(&h.score));
        }
    }

    #[test]
    fn degenerate_distance_range_scores_zero() {
        let store = test_store();
        insert(&store, "only.md", "single", Some(spike(0)));

        let opts = SearchOptions {
            top_k: 5,
            ..Default::default()
        };
        let hits = store.vector_search(&spike(0), &opts).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 0.0);
    }

    #[test]
    fn domain_and_tag_filters() {
        let store = test_store();
        let mut a = NoteRecord::new("a.md", "A", 0, "(full)", "alpha");
        a.content_hash = "h".into();
        a.domain = "work".into();
        a.tags = vec!["Rust".into()];
        let mut b = NoteRecord::new("b.md", "B", 0, "(full)", "beta");
        b.content_hash = "h".into();
        b.domain = "personal".into();
        store.replace_note("a.md", &[a], Some(&[spike(0)])).unwrap();
        store.replace_note("b.md", &[b], Some(&[spike(1)])).unwrap();

        let opts = SearchOptions {
            top_k: 10,
            domain: Some("WORK".into()),
            ..Default::default()
        };
        let hits = store.vector_search(&spike(0), &opts).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "a.md");

        let opts = SearchOptions {
            top_k: 10,
            tags: vec!["rust".into()],
            ..Default::default()
        };
        let hits = store.vector_search(&spike(0), &opts).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "a.md");
    }

    #[test]
    fn fts_search_finds_terms() {
        let store = test_store();
        insert(&store, "quantum.md", "the quantum computer runs cold", None);
        insert(&store, "rust.md", "rust is a systems language", None);

        let hits = store
            .fts_search(&["quantum".to_string()], 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "quantum.md");
    }

    #[test]
    fn fts_search_empty_terms_returns_empty() {
        let store = test_store();
        insert(&store, "a.md", "content", None);
        assert!(store.fts_search(&[], 10).unwrap().is_empty());
        // Operator-only terms strip to nothing.
        assert!(store
            .fts_search(&["***".to_string(), "(-)".to_string()], 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn fts_search_excludes_private() {
        let store = test_store();
        insert(&store, "notes/public.md", "# Public\nhello secret keeper", None);
        insert(&store, "_PRIVATE/secret.md", "# Secret\ndo not leak secret", None);

        let hits = store.fts_search(&["secret".to_string()], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "notes/public.md");
    }

    #[test]
    fn keyword_search_ranks_title_matches_higher() {
        let store = test_store();
        let mut titled = NoteRecord::new("deploy.md", "Deploy guide", 0, "(full)", "other text");
        titled.content_hash = "h".into();
        store.replace_note("deploy.md", &[titled], None).unwrap();
        insert(&store, "mention.md", "we should deploy tomorrow", None);

        let hits = store.keyword_search(&["deploy".to_string()], 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].path, "deploy.md");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn keyword_search_escapes_wildcards() {
        let store = test_store();
        insert(&store, "a.md", "one hundred percent done", None);
        // A bare % would match everything; escaped it matches nothing here.
        let hits = store.keyword_search(&["%".to_string()], 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn escape_helpers() {
        assert_eq!(escape_fts_term("a*b^c-d"), "abcd");
        assert_eq!(escape_fts_term("\"quoted\""), "quoted");
        assert_eq!(escape_like("50%_done\\"), "50\\%\\_done\\\\");
        assert_eq!(build_fts_query(&["rust".into(), "db".into()]), "\"rust\" OR \"db\"");
    }

    #[test]
    fn snippet_is_capped() {
        let store = test_store();
        let long = "word ".repeat(200);
        insert(&store, "long.md", &long, Some(spike(0)));
        let opts = SearchOptions {
            top_k: 1,
            ..Default::default()
        };
        let hits = store.vector_search(&spike(0), &opts).unwrap();
        assert!(hits[0].snippet.len() <= MAX_SNIPPET_LENGTH);
    }

    #[test]
    fn content_type_survives_roundtrip() {
        let store = test_store();
        let mut rec = NoteRecord::new("d.md", "D", 0, "(full)", "decision text");
        rec.content_hash = "h".into();
        rec.content_type = ContentType::Decision;
        store.replace_note("d.md", &[rec], Some(&[spike(0)])).unwrap();

        let hits = store.vector_search_raw(&spike(0), 5).unwrap();
        assert_eq!(hits[0].note.content_type, ContentType::Decision);
    }
}
