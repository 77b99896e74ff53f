//! Session transcript parsing.
//!
//! Transcripts are newline-delimited JSON. Two envelope shapes are
//! accepted: flat `{role, content}` and nested
//! `{type, message: {role, content}}`. Content is either a string or an
//! array of typed blocks (`text`, `tool_use`). Unknown shapes are counted
//! and reported with a parse warning rather than silently dropped.

use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// A parsed conversation message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// A parsed tool invocation from an assistant turn.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool: String,
    pub input: Value,
}

/// Everything extracted from one transcript file.
#[derive(Debug, Default)]
pub struct TranscriptData {
    pub messages: Vec<Message>,
    pub tool_calls: Vec<ToolCall>,
    pub files_changed: Vec<String>,
    /// Lines that parsed as JSON but matched no known envelope shape.
    pub unknown_shapes: usize,
}

/// Parse a JSONL transcript. Missing or unreadable files yield empty data
/// — hook paths must degrade, not fail.
pub fn parse_transcript(path: &Path) -> TranscriptData {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return TranscriptData::default();
    };

    let mut data = TranscriptData::default();
    let mut files_changed = BTreeSet::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        process_entry(&entry, &mut data, &mut files_changed);
    }

    if data.unknown_shapes > 0 {
        tracing::warn!(
            path = %path.display(),
            count = data.unknown_shapes,
            "transcript lines with unknown envelope shape were ignored"
        );
    }

    data.files_changed = files_changed.into_iter().collect();
    data
}

fn process_entry(entry: &Value, data: &mut TranscriptData, files_changed: &mut BTreeSet<String>) {
    // Nested envelope: {"type": "user", "message": {"role": ..., "content": ...}}
    let (role, body) = match entry.get("role").and_then(Value::as_str) {
        Some(role) => (role.to_string(), entry),
        None => match entry.get("message") {
            Some(inner) => match inner.get("role").and_then(Value::as_str) {
                Some(role) => (role.to_string(), inner),
                None => {
                    data.unknown_shapes += 1;
                    return;
                }
            },
            None => {
                data.unknown_shapes += 1;
                return;
            }
        },
    };

    match role.as_str() {
        "user" | "human" => {
            let content = extract_text(body);
            if !content.is_empty() {
                data.messages.push(Message {
                    role: "user".into(),
                    content,
                });
            }
        }
        "assistant" => {
            let content = extract_text(body);
            if !content.is_empty() {
                data.messages.push(Message {
                    role: "assistant".into(),
                    content,
                });
            }
            if let Some(blocks) = body.get("content").and_then(Value::as_array) {
                for block in blocks {
                    if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                        continue;
                    }
                    let tool = block
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let input = block.get("input").cloned().unwrap_or(Value::Null);
                    extract_changed_files(&tool, &input, files_changed);
                    data.tool_calls.push(ToolCall { tool, input });
                }
            }
        }
        _ => {
            data.unknown_shapes += 1;
        }
    }
}

/// Content is either a plain string or an array of `{type: "text", text}`
/// blocks.
fn extract_text(body: &Value) -> String {
    match body.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => {
            let parts: Vec<&str> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            parts.join("\n")
        }
        _ => String::new(),
    }
}

static BASH_FILE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r">\s*([^\s;|&]+)",
        r">>\s*([^\s;|&]+)",
        r"tee\s+([^\s;|&]+)",
        r"mv\s+\S+\s+([^\s;|&]+)",
        r"cp\s+\S+\s+([^\s;|&]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

fn extract_changed_files(tool: &str, input: &Value, files_changed: &mut BTreeSet<String>) {
    match tool.to_lowercase().as_str() {
        "write" | "create" | "edit" | "replace" => {
            let path = input
                .get("file_path")
                .and_then(Value::as_str)
                .or_else(|| input.get("path").and_then(Value::as_str));
            if let Some(path) = path {
                if !path.is_empty() {
                    files_changed.insert(path.to_string());
                }
            }
        }
        "bash" => {
            if let Some(command) = input.get("command").and_then(Value::as_str) {
                for pattern in BASH_FILE_PATTERNS.iter() {
                    for caps in pattern.captures_iter(command) {
                        let path = caps[1].trim_matches(['\'', '"']);
                        if !path.is_empty() && !path.starts_with('-') {
                            files_changed.insert(path.to_string());
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

/// Last `n` messages from a transcript, optionally filtered by role.
pub fn last_messages(path: &Path, n: usize, role: Option<&str>) -> Vec<Message> {
    let parsed = parse_transcript(path);
    let mut messages = parsed.messages;
    if let Some(role) = role {
        messages.retain(|m| m.role == role);
    }
    if messages.len() > n {
        messages.drain(..messages.len() - n);
    }
    messages
}
