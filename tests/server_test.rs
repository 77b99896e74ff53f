mod helpers;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use helpers::{vault_config, DIM};
use same::server::protocol::{ErrorKind, Request, Response, ToolError};
use same::server::tools::SameTools;
use same::store::Store;
use serde_json::json;

fn tools_for(vault: &std::path::Path) -> SameTools {
    let store = Arc::new(Store::open_in_memory(DIM).unwrap());
    let config = Arc::new(vault_config(vault));
    SameTools::new(store, None, config, Arc::new(AtomicBool::new(false)))
}

fn write_note(vault: &std::path::Path, rel: &str, content: &str) {
    let path = vault.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn traversal_paths_return_not_found() {
    let vault = tempfile::tempdir().unwrap();
    write_note(vault.path(), "notes/ok.md", "# OK\nfine");
    let tools = tools_for(vault.path());

    for path in [
        "notes/../../etc/passwd",
        "../outside.md",
        "/etc/passwd",
        "C:/Windows/system.md",
        "notes/..\\..\\up.md",
    ] {
        let err = tools
            .dispatch("get_note", &json!({ "path": path }))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound, "path {path:?}");
    }
}

#[test]
fn null_byte_path_is_invalid_argument() {
    let vault = tempfile::tempdir().unwrap();
    let tools = tools_for(vault.path());
    let err = tools
        .dispatch("get_note", &json!({ "path": "notes/evil\u{0}.md" }))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[cfg(unix)]
#[test]
fn symlinked_directory_inside_vault_is_served() {
    let vault = tempfile::tempdir().unwrap();
    write_note(vault.path(), "real/ok.md", "# OK\nsymlinked contents");
    std::os::unix::fs::symlink(vault.path().join("real"), vault.path().join("notes")).unwrap();

    let tools = tools_for(vault.path());
    let result = tools
        .dispatch("get_note", &json!({ "path": "notes/ok.md" }))
        .unwrap();
    assert!(result["content"].as_str().unwrap().contains("symlinked contents"));
}

#[cfg(unix)]
#[test]
fn symlink_escaping_vault_is_not_found() {
    let vault = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("secret.md"), "secret").unwrap();
    std::os::unix::fs::symlink(outside.path(), vault.path().join("leak")).unwrap();

    let tools = tools_for(vault.path());
    let err = tools
        .dispatch("get_note", &json!({ "path": "leak/secret.md" }))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[test]
fn private_paths_look_like_absence() {
    let vault = tempfile::tempdir().unwrap();
    write_note(vault.path(), "_PRIVATE/secret.md", "# Secret");
    let tools = tools_for(vault.path());

    let err = tools
        .dispatch("get_note", &json!({ "path": "_PRIVATE/secret.md" }))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    // Identical shape to a genuinely missing note.
    let missing = tools
        .dispatch("get_note", &json!({ "path": "nope/missing.md" }))
        .unwrap_err();
    assert_eq!(missing.kind, ErrorKind::NotFound);
}

#[test]
fn reindex_hits_rate_limit_after_thirty_writes() {
    let vault = tempfile::tempdir().unwrap();
    write_note(vault.path(), "a.md", "# A\ncontent");
    let tools = tools_for(vault.path());

    // First call indexes; the following 29 land in the cooldown window but
    // still consume write slots.
    for i in 0..30 {
        let result = tools.dispatch("reindex", &json!({}));
        assert!(result.is_ok(), "call {i} should pass the rate limiter");
    }

    let err = tools.dispatch("reindex", &json!({})).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimited);
}

#[test]
fn search_roundtrip_over_indexed_vault() {
    let vault = tempfile::tempdir().unwrap();
    write_note(vault.path(), "notes/pipeline.md", "# Pipeline\nthe embedding pipeline design");
    write_note(vault.path(), "notes/other.md", "# Other\nunrelated gardening tips");
    let tools = tools_for(vault.path());

    tools.dispatch("reindex", &json!({})).unwrap();

    let result = tools
        .dispatch("search_notes", &json!({ "query": "embedding pipeline" }))
        .unwrap();
    let results = result["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["path"], "notes/pipeline.md");

    let stats = tools.dispatch("index_stats", &json!({})).unwrap();
    assert_eq!(stats["note_count"], 2);
    assert!(stats["last_reindex"].is_string());
}

#[test]
fn filtered_search_applies_metadata() {
    let vault = tempfile::tempdir().unwrap();
    write_note(
        vault.path(),
        "notes/infra.md",
        "---\ndomain: infra\ntags: [deploy]\n---\nrollout process for the deploy pipeline",
    );
    write_note(
        vault.path(),
        "notes/personal.md",
        "---\ndomain: personal\n---\nrollout of my new deploy habits",
    );
    let tools = tools_for(vault.path());
    tools.dispatch("reindex", &json!({})).unwrap();

    // Keyword path ignores filters only when unfiltered; the filtered
    // variant must narrow by domain even in FTS fallback.
    let result = tools
        .dispatch(
            "search_notes_filtered",
            &json!({ "query": "rollout deploy", "domain": "infra" }),
        )
        .unwrap();
    let results = result["results"].as_array().unwrap();
    assert!(results
        .iter()
        .all(|r| r["path"].as_str().unwrap() != "notes/personal.md"));
}

#[test]
fn protocol_frames_survive_malformed_requests() {
    // Round-trip the framing layer directly: a malformed line yields an
    // error response with a null id, and the next frame still parses.
    let bad: Result<Request, _> = serde_json::from_str("{not json");
    assert!(bad.is_err());
    let response = Response::err(
        serde_json::Value::Null,
        ToolError::invalid_argument("malformed request"),
    );
    let line = response.to_line();
    let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed["error"]["kind"], "invalid_argument");

    let good: Request =
        serde_json::from_str(r#"{"id": 7, "method": "index_stats", "arguments": {}}"#).unwrap();
    assert_eq!(good.method, "index_stats");
}
