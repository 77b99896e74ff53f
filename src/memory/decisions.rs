//! Decision extraction from session transcripts.
//!
//! Assistant messages are scanned line-by-line for decision language; the
//! matches are appended to the vault's decision log as dated bullets
//! tagged `[auto-extracted]` for later human review.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use super::transcript::Message;

static DECISION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(decided to|decision:)\s*(.{10,240})",
        r"(?i)\b(we will use|we'll use|going with|we chose|settled on)\s+(.{5,240})",
        r"(?i)\b(agreed to|agreement:)\s*(.{10,240})",
        r"(?i)\b(conclusion:)\s*(.{10,240})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Scan messages for decision language. Only assistant turns are
/// considered; matches deduplicate on normalized text.
pub fn extract_decisions(messages: &[Message]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut decisions = Vec::new();

    for message in messages {
        if message.role != "assistant" {
            continue;
        }
        for line in message.content.lines() {
            let line = line.trim().trim_start_matches(['-', '*', ' ']);
            if line.len() < 15 || line.len() > 500 {
                continue;
            }
            for pattern in DECISION_PATTERNS.iter() {
                if pattern.is_match(line) {
                    let normalized = line.to_lowercase();
                    if seen.insert(normalized) {
                        decisions.push(line.to_string());
                    }
                    break;
                }
            }
        }
    }
    decisions
}

/// Append decisions to the log file, skipping any already present.
/// Returns the number of lines actually written.
pub fn append_to_decision_log(decisions: &[String], log_path: &Path) -> Result<usize> {
    if decisions.is_empty() {
        return Ok(0);
    }

    let existing = std::fs::read_to_string(log_path).unwrap_or_default();
    let today = chrono::Utc::now().format("%Y-%m-%d");

    let mut appended = 0usize;
    let mut out = String::new();
    for decision in decisions {
        if existing.contains(decision.as_str()) {
            continue;
        }
        out.push_str(&format!("- {today} {decision} [auto-extracted]\n"));
        appended += 1;
    }

    if appended == 0 {
        return Ok(0);
    }

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }

    let mut contents = existing;
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&out);
    std::fs::write(log_path, contents)
        .with_context(|| format!("write {}", log_path.display()))?;

    Ok(appended)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(content: &str) -> Message {
        Message {
            role: "assistant".into(),
            content: content.into(),
        }
    }

    #[test]
    fn extracts_decision_language() {
        let messages = vec![assistant(
            "After benchmarking, we decided to keep rusqlite over sqlx.\nUnrelated line.\nGoing with WAL mode for all connections.",
        )];
        let decisions = extract_decisions(&messages);
        assert_eq!(decisions.len(), 2);
        assert!(decisions[0].contains("decided to keep rusqlite"));
        assert!(decisions[1].contains("Going with WAL mode"));
    }

    #[test]
    fn user_messages_are_ignored() {
        let messages = vec![Message {
            role: "user".into(),
            content: "I decided to take a break from this project".into(),
        }];
        assert!(extract_decisions(&messages).is_empty());
    }

    #[test]
    fn duplicates_collapse() {
        let messages = vec![
            assistant("We decided to use exponential backoff here."),
            assistant("we decided to use exponential backoff here."),
        ];
        assert_eq!(extract_decisions(&messages).len(), 1);
    }

    #[test]
    fn append_writes_dated_tagged_bullets() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("decisions.md");

        let decisions = vec!["We decided to ship on Friday.".to_string()];
        let count = append_to_decision_log(&decisions, &log).unwrap();
        assert_eq!(count, 1);

        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.contains("We decided to ship on Friday."));
        assert!(contents.contains("[auto-extracted]"));
        assert!(contents.starts_with("- 2"));

        // A second run with the same decision appends nothing.
        let count = append_to_decision_log(&decisions, &log).unwrap();
        assert_eq!(count, 0);
        assert_eq!(
            std::fs::read_to_string(&log).unwrap().lines().count(),
            contents.lines().count()
        );
    }
}
