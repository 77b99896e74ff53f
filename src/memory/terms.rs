//! Query term extraction and near-duplicate path collapse.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Common words dropped during term extraction.
const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "but", "by", "can", "did", "do", "does",
    "for", "from", "had", "has", "have", "how", "i", "if", "in", "into", "is", "it", "its", "me",
    "my", "no", "not", "of", "on", "or", "our", "she", "show", "so", "tell", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "to", "up", "was", "we", "were",
    "what", "when", "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Meaningful two-letter terms that survive the length cut.
const ACRONYM_ALLOWLIST: &[&str] = &["ai", "ci", "db", "ml", "os", "qa", "ui", "ux"];

/// Rough token estimate: one token per four characters.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// True if the word is in the stop-word list.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Extract search terms: lowercase, strip punctuation, split on
/// whitespace, drop stop words, drop short terms outside the acronym
/// allowlist, dedupe preserving order.
pub fn extract_terms(query: &str) -> Vec<String> {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut seen = HashSet::new();
    let mut terms = Vec::new();
    for word in cleaned.split_whitespace() {
        if is_stop_word(word) {
            continue;
        }
        if word.len() < 2 {
            continue;
        }
        if word.len() == 2 && !ACRONYM_ALLOWLIST.contains(&word) {
            continue;
        }
        if seen.insert(word.to_string()) {
            terms.push(word.to_string());
        }
    }
    terms
}

static DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}[-_/]\d{2}[-_/]\d{2}[-_ ]*").unwrap());
static VERSION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([-_ ]v\d+|\s*\(\d+\))$").unwrap());

/// Canonical key for near-duplicate collapse: file stem, lowercased,
/// separators normalized, date prefix and trailing version suffix
/// stripped. Paths sharing a key are treated as versions of one note.
pub fn canonical_note_key(path: &str) -> String {
    let stem = path
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .trim_end_matches(".md")
        .trim_end_matches(".markdown");

    let mut key = stem.to_lowercase().replace(['_', '-'], " ");
    key = DATE_PREFIX.replace(&key, "").into_owned();
    key = VERSION_SUFFIX.replace(&key, "").into_owned();
    key.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse near-duplicate paths in a ranked list, keeping the first
/// (highest-scoring) entry for each canonical key. `path_of` projects an
/// item to its path.
pub fn collapse_near_duplicates<T>(items: Vec<T>, path_of: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(canonical_note_key(path_of(item))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_drops_stop_words_and_punctuation() {
        let terms = extract_terms("How does the composite scoring work?");
        assert_eq!(terms, vec!["composite", "scoring", "work"]);
    }

    #[test]
    fn extraction_keeps_allowlisted_acronyms() {
        let terms = extract_terms("db migration for the UI");
        assert_eq!(terms, vec!["db", "migration", "ui"]);
    }

    #[test]
    fn extraction_drops_short_junk() {
        // Single letters always go; two-letter terms only survive via the
        // acronym allowlist.
        let terms = extract_terms("x y zz refactor");
        assert_eq!(terms, vec!["refactor"]);
    }

    #[test]
    fn extraction_dedupes_preserving_order() {
        let terms = extract_terms("deploy deploy rollback deploy");
        assert_eq!(terms, vec!["deploy", "rollback"]);
    }

    #[test]
    fn token_estimate_is_chars_over_four() {
        assert_eq!(estimate_tokens("abcd".repeat(10).as_str()), 10);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn canonical_key_strips_versions_and_dates() {
        assert_eq!(canonical_note_key("notes/deploy-plan_v2.md"), "deploy plan");
        assert_eq!(canonical_note_key("notes/deploy-plan.md"), "deploy plan");
        assert_eq!(canonical_note_key("notes/deploy plan (2).md"), "deploy plan");
        assert_eq!(canonical_note_key("2026-01-15-deploy-plan.md"), "deploy plan");
        assert_eq!(canonical_note_key("2026_01_15 deploy plan.md"), "deploy plan");
    }

    #[test]
    fn canonical_key_distinguishes_genuinely_different_notes() {
        assert_ne!(
            canonical_note_key("deploy-plan.md"),
            canonical_note_key("rollback-plan.md")
        );
        // A version-like token mid-name is not a suffix.
        assert_ne!(
            canonical_note_key("v2-migration.md"),
            canonical_note_key("migration.md")
        );
    }

    #[test]
    fn collapse_keeps_first_of_each_key() {
        let items = vec![
            ("notes/deploy-plan_v2.md", 0.9),
            ("notes/deploy-plan.md", 0.7),
            ("notes/other.md", 0.5),
        ];
        let collapsed = collapse_near_duplicates(items, |(p, _)| p);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].0, "notes/deploy-plan_v2.md");
        assert_eq!(collapsed[1].0, "notes/other.md");
    }
}
