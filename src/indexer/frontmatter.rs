//! Frontmatter parsing.
//!
//! A leading `---` fenced block is parsed as a flat key-value map.
//! Recognized keys map to note-record fields; unknown keys are retained in
//! a generic properties map for round-tripping.

use std::collections::BTreeMap;

/// Parsed frontmatter fields. Anything unrecognized lands in `properties`.
#[derive(Debug, Default, Clone)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub domain: Option<String>,
    pub workstream: Option<String>,
    pub content_type: Option<String>,
    pub review_by: Option<String>,
    pub confidence: Option<f64>,
    pub agent: Option<String>,
    pub properties: BTreeMap<String, String>,
}

/// Split a note into parsed frontmatter and the remaining body. Notes
/// without a frontmatter fence come back with an empty `Frontmatter` and
/// the body untouched.
pub fn parse(content: &str) -> (Frontmatter, &str) {
    let Some(rest) = content.strip_prefix("---") else {
        return (Frontmatter::default(), content);
    };
    // The opening fence must be its own line.
    let Some(rest) = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) else {
        return (Frontmatter::default(), content);
    };

    let Some(end) = find_closing_fence(rest) else {
        return (Frontmatter::default(), content);
    };

    let block = &rest[..end.block_end];
    let body = &rest[end.body_start..];

    let mut fm = Frontmatter::default();
    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = strip_quotes(value.trim());

        match key.as_str() {
            "title" => fm.title = non_empty(value),
            "tags" => fm.tags = parse_tags(value),
            "domain" => fm.domain = non_empty(value),
            "workstream" => fm.workstream = non_empty(value),
            "content_type" | "type" => fm.content_type = non_empty(value),
            "review_by" | "review-by" => fm.review_by = non_empty(value),
            "confidence" => fm.confidence = value.parse().ok(),
            "agent" => fm.agent = non_empty(value),
            _ => {
                fm.properties.insert(key, value.to_string());
            }
        }
    }

    (fm, body)
}

struct FenceEnd {
    block_end: usize,
    body_start: usize,
}

fn find_closing_fence(rest: &str) -> Option<FenceEnd> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some(FenceEnd {
                block_end: offset,
                body_start: offset + line.len(),
            });
        }
        offset += line.len();
    }
    None
}

/// Tags come in two shapes: `[a, b, c]` inline arrays or a bare
/// comma-separated list.
fn parse_tags(value: &str) -> Vec<String> {
    let inner = value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    inner
        .split(',')
        .map(|t| strip_quotes(t.trim()).to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn strip_quotes(value: &str) -> &str {
    value
        .trim()
        .trim_start_matches(['"', '\''])
        .trim_end_matches(['"', '\''])
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_without_frontmatter_passes_through() {
        let (fm, body) = parse("# Just a note\n\ncontent");
        assert!(fm.title.is_none());
        assert_eq!(body, "# Just a note\n\ncontent");
    }

    #[test]
    fn parses_recognized_keys() {
        let content = "---\ntitle: Deploy Runbook\ntags: [ops, deploy]\ndomain: infra\nworkstream: platform\ncontent_type: decision\nreview_by: 2026-09-01\nconfidence: 0.9\nagent: claude\n---\n# Body\n";
        let (fm, body) = parse(content);
        assert_eq!(fm.title.as_deref(), Some("Deploy Runbook"));
        assert_eq!(fm.tags, vec!["ops", "deploy"]);
        assert_eq!(fm.domain.as_deref(), Some("infra"));
        assert_eq!(fm.workstream.as_deref(), Some("platform"));
        assert_eq!(fm.content_type.as_deref(), Some("decision"));
        assert_eq!(fm.review_by.as_deref(), Some("2026-09-01"));
        assert_eq!(fm.confidence, Some(0.9));
        assert_eq!(fm.agent.as_deref(), Some("claude"));
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn unknown_keys_land_in_properties() {
        let (fm, _) = parse("---\ntitle: X\naliases: other-name\nstatus: draft\n---\nbody");
        assert_eq!(fm.properties.get("aliases").map(String::as_str), Some("other-name"));
        assert_eq!(fm.properties.get("status").map(String::as_str), Some("draft"));
    }

    #[test]
    fn bare_comma_tags_and_quotes() {
        let (fm, _) = parse("---\ntags: rust, \"database\"\ntitle: 'Quoted'\n---\nx");
        assert_eq!(fm.tags, vec!["rust", "database"]);
        assert_eq!(fm.title.as_deref(), Some("Quoted"));
    }

    #[test]
    fn unterminated_fence_is_not_frontmatter() {
        let content = "---\ntitle: Broken\nno closing fence";
        let (fm, body) = parse(content);
        assert!(fm.title.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn type_alias_for_content_type() {
        let (fm, _) = parse("---\ntype: handoff\n---\nx");
        assert_eq!(fm.content_type.as_deref(), Some("handoff"));
    }

    #[test]
    fn bad_confidence_is_ignored() {
        let (fm, _) = parse("---\nconfidence: very high\n---\nx");
        assert!(fm.confidence.is_none());
    }
}
