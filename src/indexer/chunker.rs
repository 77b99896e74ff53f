//! Heading-aware note chunking.
//!
//! Short bodies stay whole. Long bodies split at H2 headings, with H3
//! sub-splitting for sections that exceed the embedding context limit, and
//! paragraph splitting as the last resort.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::{CHUNK_THRESHOLD, MAX_EMBED_CHARS};

/// A portion of a note body, the unit of embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub heading: String,
    pub text: String,
}

static H2_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^## ").unwrap());
static H3_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^### ").unwrap());

/// Chunk a note body.
///
/// Bodies under [`CHUNK_THRESHOLD`] become a single `(full)` chunk.
/// Otherwise the body splits at H2 headings (pre-H2 text becomes an
/// `(intro)` chunk); H2 sections over [`MAX_EMBED_CHARS`] sub-split at H3;
/// anything still oversized splits at paragraph boundaries into
/// `(part N)` chunks.
pub fn chunk_note(body: &str) -> Vec<Chunk> {
    if body.len() < CHUNK_THRESHOLD {
        return vec![Chunk {
            heading: "(full)".into(),
            text: body.to_string(),
        }];
    }

    // No headings to split on: paragraph-split if oversized, else keep
    // whole.
    if !H2_SPLIT.is_match(body) {
        if body.len() > MAX_EMBED_CHARS {
            return chunk_by_size(body, MAX_EMBED_CHARS)
                .into_iter()
                .enumerate()
                .map(|(i, text)| Chunk {
                    heading: format!("(part {})", i + 1),
                    text,
                })
                .collect();
        }
        return vec![Chunk {
            heading: "(full)".into(),
            text: body.to_string(),
        }];
    }

    let mut chunks = chunk_by_headings(body);

    // Last resort: paragraph-split anything the heading passes left
    // oversized.
    let mut out = Vec::with_capacity(chunks.len());
    for chunk in chunks.drain(..) {
        if chunk.text.len() > MAX_EMBED_CHARS {
            for (i, part) in chunk_by_size(&chunk.text, MAX_EMBED_CHARS).into_iter().enumerate() {
                out.push(Chunk {
                    heading: format!("{} (part {})", chunk.heading, i + 1),
                    text: part,
                });
            }
        } else {
            out.push(chunk);
        }
    }
    out
}

/// Split a body by H2 headings, with H3 sub-splitting for large sections.
fn chunk_by_headings(body: &str) -> Vec<Chunk> {
    let parts: Vec<&str> = H2_SPLIT.split(body).collect();
    let mut chunks = Vec::new();

    // Text before the first H2 is the intro.
    if !parts[0].trim().is_empty() {
        chunks.push(Chunk {
            heading: "(intro)".into(),
            text: parts[0].trim().to_string(),
        });
    }

    for part in &parts[1..] {
        let (heading, text) = split_heading_line(part);
        if text.is_empty() {
            continue;
        }

        let full_text = format!("## {heading}\n{text}");

        if full_text.len() > MAX_EMBED_CHARS {
            let h3_parts: Vec<&str> = H3_SPLIT.split(&full_text).collect();
            if h3_parts.len() > 1 {
                if !h3_parts[0].trim().is_empty() {
                    chunks.push(Chunk {
                        heading: heading.clone(),
                        text: h3_parts[0].trim().to_string(),
                    });
                }
                for h3_part in &h3_parts[1..] {
                    let (h3_heading, h3_text) = split_heading_line(h3_part);
                    if !h3_text.is_empty() {
                        chunks.push(Chunk {
                            heading: format!("{heading} > {h3_heading}"),
                            text: format!("### {h3_heading}\n{h3_text}"),
                        });
                    }
                }
            } else {
                chunks.push(Chunk {
                    heading,
                    text: full_text,
                });
            }
        } else {
            chunks.push(Chunk {
                heading,
                text: full_text,
            });
        }
    }

    if chunks.is_empty() {
        return vec![Chunk {
            heading: "(full)".into(),
            text: body.to_string(),
        }];
    }
    chunks
}

/// Split a heading-led section into (heading line, remaining text).
fn split_heading_line(part: &str) -> (String, String) {
    match part.split_once('\n') {
        Some((first, rest)) => (first.trim().to_string(), rest.trim().to_string()),
        None => (part.trim().to_string(), String::new()),
    }
}

/// Split text into chunks at paragraph boundaries, each at most
/// `max_chars` long where paragraph sizes allow.
pub fn chunk_by_size(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        if current.len() + para.len() + 2 > max_chars && !current.is_empty() {
            chunks.push(current.trim().to_string());
            current = para.to_string();
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(para);
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}
