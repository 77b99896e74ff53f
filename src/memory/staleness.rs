//! Stale-note reporting.
//!
//! Notes carry an optional review-by date; once it passes, the note is
//! stale and the session-start hook surfaces it for review.

use chrono::{NaiveDate, Utc};

use crate::store::Store;

/// A note past (or approaching) its review-by date.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StaleNote {
    pub path: String,
    pub title: String,
    pub review_by: String,
    pub days_overdue: i64,
    pub content_type: String,
}

/// Find notes with review-by dates, most overdue first. With
/// `overdue_only`, future review dates are excluded.
pub fn find_stale_notes(store: &Store, max_results: usize, overdue_only: bool) -> Vec<StaleNote> {
    let notes = match store.notes_with_review_by(max_results * 2) {
        Ok(notes) => notes,
        Err(_) => return Vec::new(),
    };

    let today = Utc::now().date_naive();
    let mut results = Vec::new();

    for note in notes {
        let Some(review_date) = parse_review_date(note.review_by.trim()) else {
            continue;
        };
        let days_overdue = (today - review_date).num_days();
        if overdue_only && days_overdue < 0 {
            continue;
        }
        results.push(StaleNote {
            path: note.path,
            title: note.title,
            review_by: note.review_by.trim().to_string(),
            days_overdue,
            content_type: note.content_type.as_str().to_string(),
        });
    }

    results.sort_by(|a, b| b.days_overdue.cmp(&a.days_overdue));
    results.truncate(max_results);
    results
}

/// Format stale notes for context injection, capped at five lines.
pub fn format_stale_notes(stale: &[StaleNote]) -> String {
    if stale.is_empty() {
        return String::new();
    }

    let mut lines = vec!["Notes past their review-by date:".to_string()];
    for note in stale.iter().take(5) {
        let urgency = match note.days_overdue {
            d if d > 0 => format!("OVERDUE by {d} days"),
            0 => "due today".to_string(),
            _ => "upcoming".to_string(),
        };
        lines.push(format!("- [{}]({}) — {}", note.title, note.path, urgency));
    }
    lines.join("\n")
}

/// Accept RFC 3339 timestamps and plain `YYYY-MM-DD` / `YYYY/MM/DD` dates.
fn parse_review_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    None
}
