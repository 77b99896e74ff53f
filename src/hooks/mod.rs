//! Session-lifecycle hook handlers.
//!
//! Each handler is a pure function over the host-supplied hook input and
//! returns an optional context payload for the host to inject. Failures
//! always degrade to no output — a hook never surfaces a partial bundle
//! and never crashes the host.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::SameConfig;
use crate::embedding::EmbeddingProvider;
use crate::memory::{decisions, handoff, staleness, surface, transcript};
use crate::store::Store;

/// Number of trailing transcript messages scanned at session end.
const SESSION_END_MESSAGE_WINDOW: usize = 200;

/// Session-start context is bounded to this many characters.
const SESSION_START_MAX_CHARS: usize = 500;

/// Hook invocation payload, read as JSON from stdin.
#[derive(Debug, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub transcript_path: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub hook_event_name: String,
    #[serde(default)]
    pub cwd: String,
}

/// Hook response envelope, written as JSON to stdout.
#[derive(Debug, Serialize)]
pub struct HookOutput {
    #[serde(rename = "hookSpecificOutput")]
    pub hook_specific_output: HookSpecific,
}

#[derive(Debug, Serialize)]
pub struct HookSpecific {
    #[serde(rename = "hookEventName")]
    pub hook_event_name: String,
    #[serde(rename = "additionalContext")]
    pub additional_context: String,
}

fn output(event: &str, context: String) -> HookOutput {
    HookOutput {
        hook_specific_output: HookSpecific {
            hook_event_name: event.to_string(),
            additional_context: context,
        },
    }
}

/// Prompt-submit hook: run the full context-surfacing pipeline.
pub fn prompt_submit(
    store: &Store,
    provider: Option<&dyn EmbeddingProvider>,
    input: &HookInput,
) -> Option<HookOutput> {
    let surfaced = surface::surface_context(
        store,
        provider,
        &input.prompt,
        &input.session_id,
        "UserPromptSubmit",
    )?;
    Some(output("UserPromptSubmit", surfaced.context))
}

/// Session-end hook: extract decisions into the decision log and write a
/// handoff note. Both effects are best-effort; the hook reports counts for
/// whatever succeeded.
pub fn session_end(store: &Store, config: &SameConfig, input: &HookInput) -> Option<HookOutput> {
    if input.transcript_path.is_empty() {
        return None;
    }
    let transcript_path = Path::new(&input.transcript_path);
    if !transcript_path.exists() {
        return None;
    }

    let mut parsed = transcript::parse_transcript(transcript_path);
    if parsed.messages.len() > SESSION_END_MESSAGE_WINDOW {
        let skip = parsed.messages.len() - SESSION_END_MESSAGE_WINDOW;
        parsed.messages.drain(..skip);
    }
    if parsed.messages.is_empty() {
        return None;
    }

    let mut report_lines = Vec::new();

    let found = decisions::extract_decisions(&parsed.messages);
    if !found.is_empty() {
        let log_path = config.vault_path().join(config.decision_log());
        match decisions::append_to_decision_log(&found, &log_path) {
            Ok(count) if count > 0 => {
                report_lines.push(format!(
                    "Extracted {count} decision(s) to {} (tagged for review).",
                    config.decision_log()
                ));
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "decision log append failed"),
        }
    }

    match handoff::write_handoff(
        store,
        &config.vault_path(),
        &config.handoff_dir(),
        &input.session_id,
        transcript_path,
        &parsed,
    ) {
        Ok(result) => {
            report_lines.push(format!("Session handoff written to {}.", result.path));
        }
        Err(err) => tracing::warn!(error = %err, "handoff generation failed"),
    }

    if report_lines.is_empty() {
        return None;
    }

    Some(output(
        "Stop",
        format!("\n<vault-handoff>\n{}\n</vault-handoff>\n", report_lines.join("\n")),
    ))
}

/// Session-start hook: surface overdue notes and the latest handoff,
/// bounded to a small fixed budget.
pub fn session_start(store: &Store, input: &HookInput) -> Option<HookOutput> {
    let mut sections = Vec::new();

    let stale = staleness::find_stale_notes(store, 5, true);
    let stale_text = staleness::format_stale_notes(&stale);
    if !stale_text.is_empty() {
        sections.push(stale_text);
    }

    if let Ok(Some(note)) = store.latest_handoff() {
        sections.push(format!("Last handoff: [{}]({})", note.title, note.path));
    }

    if sections.is_empty() {
        return None;
    }

    let mut context = sections.join("\n\n");
    if context.len() > SESSION_START_MAX_CHARS {
        let cut = crate::store::search::floor_char_boundary(&context, SESSION_START_MAX_CHARS);
        context.truncate(cut);
    }

    let _ = input; // session id is unused until usage marking happens host-side
    Some(output(
        "SessionStart",
        format!("\n<session-context>\n{context}\n</session-context>\n"),
    ))
}
