//! Configuration: vault resolution, environment overrides, vault registry.
//!
//! SAME is configured primarily through environment variables (the binary is
//! usually launched by an agent host, not a shell user). An optional
//! `<vault>/.same/config.toml` provides file-based defaults that the
//! environment can override.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default embedding model served by Ollama.
pub const EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension (nomic-embed-text).
pub const EMBEDDING_DIM: usize = 768;

/// Notes longer than this are chunked by H2 headings.
pub const CHUNK_THRESHOLD: usize = 6_000;

/// Hard upper bound on chunk size sent to the embedding endpoint
/// (nomic-embed-text context is ~8192 tokens).
pub const MAX_EMBED_CHARS: usize = 7_500;

/// Snippet cap for search-tool results.
pub const MAX_SNIPPET_LENGTH: usize = 500;

/// Directory-name token that excludes a path from indexing and every
/// response, compared case-insensitively.
pub const PRIVATE_PREFIX: &str = "_PRIVATE";

/// Dotfiles/directories that mark a directory as a vault root, checked in
/// priority order: SAME's own marker first, then common markdown tools.
const VAULT_MARKERS: &[&str] = &[".same", ".obsidian", ".logseq", ".foam", ".dendron"];

/// Directories always skipped during vault walks. `_PRIVATE` holds
/// client-sensitive content and must never be indexed or auto-surfaced.
const DEFAULT_SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    ".smart-env",
    ".obsidian",
    ".logseq",
    ".same",
    ".claude",
    ".trash",
    PRIVATE_PREFIX,
];

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SameConfig {
    pub vault: VaultConfig,
    pub embedding: EmbeddingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct VaultConfig {
    /// Explicit vault root. Empty means "resolve at load time".
    pub path: String,
    /// Data directory override. Empty means `<vault>/.same/data`.
    pub data_dir: String,
    /// Subdirectory (vault-relative) for session handoff notes.
    pub handoff_dir: String,
    /// Vault-relative path of the decision log.
    pub decision_log: String,
    /// Extra comma-separated skip-dir names on top of the built-in set.
    pub extra_skip_dirs: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `ollama`, `openai`, `openai-compatible`, `none`, or `auto`.
    pub provider: String,
    /// Chat-generation provider, same value set. Recognized for forward
    /// compatibility; the core only consumes the embedding side.
    pub chat_provider: String,
    pub model: String,
    pub dim: usize,
    /// Base URL for the local Ollama-style endpoint. Must be localhost.
    pub ollama_url: String,
    /// Base URL for a remote OpenAI-compatible endpoint.
    pub base_url: String,
    /// API key for remote endpoints.
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

impl Default for SameConfig {
    fn default() -> Self {
        Self {
            vault: VaultConfig::default(),
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "auto".into(),
            chat_provider: "auto".into(),
            model: EMBEDDING_MODEL.into(),
            dim: EMBEDDING_DIM,
            ollama_url: "http://localhost:11434".into(),
            base_url: String::new(),
            api_key: String::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl SameConfig {
    /// Resolve the vault, load `<vault>/.same/config.toml` if present, then
    /// apply environment overrides. `vault_override` is the `--vault` flag
    /// (an alias from the registry or a direct path).
    pub fn load(vault_override: Option<&str>) -> Result<Self> {
        let vault = resolve_vault_path(vault_override)?;

        let config_path = vault.join(".same").join("config.toml");
        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            SameConfig::default()
        };

        config.vault.path = vault.to_string_lossy().into_owned();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides. Called after the TOML load so
    /// the environment always wins.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SAME_DATA_DIR") {
            self.vault.data_dir = v;
        }
        if let Ok(v) = std::env::var("SAME_HANDOFF_DIR") {
            self.vault.handoff_dir = v;
        }
        if let Ok(v) = std::env::var("SAME_DECISION_LOG") {
            self.vault.decision_log = v;
        }
        if let Ok(v) = std::env::var("SAME_SKIP_DIRS") {
            self.vault.extra_skip_dirs = v;
        }
        if let Ok(v) = std::env::var("OLLAMA_URL") {
            self.embedding.ollama_url = v;
        }
        if let Ok(v) = std::env::var("SAME_EMBED_PROVIDER") {
            self.embedding.provider = v;
        }
        if let Ok(v) = std::env::var("SAME_CHAT_PROVIDER") {
            self.embedding.chat_provider = v;
        }
        if let Ok(v) = std::env::var("SAME_EMBED_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("SAME_EMBED_API_KEY") {
            self.embedding.api_key = v;
        }
        if let Ok(v) = std::env::var("SAME_LOG_LEVEL") {
            self.server.log_level = v;
        }
    }

    /// The resolved vault root.
    pub fn vault_path(&self) -> PathBuf {
        PathBuf::from(&self.vault.path)
    }

    /// Data directory: `SAME_DATA_DIR` or `<vault>/.same/data`.
    pub fn data_dir(&self) -> PathBuf {
        if !self.vault.data_dir.is_empty() {
            return expand_tilde(&self.vault.data_dir);
        }
        self.vault_path().join(".same").join("data")
    }

    /// Path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("vault.db")
    }

    /// Vault-relative handoff-notes directory (default `sessions`).
    pub fn handoff_dir(&self) -> String {
        if self.vault.handoff_dir.is_empty() {
            "sessions".into()
        } else {
            self.vault.handoff_dir.clone()
        }
    }

    /// Vault-relative decision-log filename (default `decisions.md`).
    pub fn decision_log(&self) -> String {
        if self.vault.decision_log.is_empty() {
            "decisions.md".into()
        } else {
            self.vault.decision_log.clone()
        }
    }

    /// Directory names skipped during vault walks: the built-in set plus
    /// any comma-separated extras.
    pub fn skip_dirs(&self) -> HashSet<String> {
        let mut dirs: HashSet<String> =
            DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect();
        for d in self.vault.extra_skip_dirs.split(',') {
            let d = d.trim();
            if !d.is_empty() {
                dirs.insert(d.to_string());
            }
        }
        dirs
    }

}

impl EmbeddingConfig {
    /// Validate the local embedding URL: the host must resolve textually to
    /// localhost. Anything else is a fatal configuration error.
    pub fn validated_ollama_url(&self) -> Result<String> {
        let host = url_host(&self.ollama_url)
            .with_context(|| format!("invalid OLLAMA_URL: {}", self.ollama_url))?;
        if host != "localhost" && host != "127.0.0.1" && host != "::1" {
            bail!(
                "OLLAMA_URL must point to localhost for security, got host {host:?}. \
                 Use SAME_EMBED_PROVIDER=openai-compatible with SAME_EMBED_BASE_URL \
                 for remote endpoints."
            );
        }
        Ok(self.ollama_url.trim_end_matches('/').to_string())
    }
}

/// Extract the host portion of an http(s) URL without pulling in a URL
/// crate. Handles `[::1]` bracket syntax and port suffixes.
fn url_host(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))?;
    let authority = rest.split('/').next()?;
    if let Some(bracketed) = authority.strip_prefix('[') {
        return Some(bracketed.split(']').next()?.to_string());
    }
    Some(authority.split(':').next()?.to_string())
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ── Vault registry ────────────────────────────────────────────────────────────

/// Registered vault paths keyed by user-chosen alias, stored once in the
/// user's config directory (not per-vault).
#[derive(Debug, Default, Clone, serde::Serialize, Deserialize)]
pub struct VaultRegistry {
    #[serde(default)]
    pub vaults: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub default: String,
}

/// Path of the vault registry file: `~/.config/same/vaults.json`.
pub fn registry_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".config")
        .join("same")
        .join("vaults.json")
}

impl VaultRegistry {
    /// Load the registry, returning an empty one on any read/parse failure.
    pub fn load() -> Self {
        Self::load_from(&registry_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(data) => serde_json::from_slice(&data).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&registry_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Resolve an alias to a path. Falls back to treating the alias as a
    /// direct path if it names an existing directory.
    pub fn resolve(&self, alias: &str) -> Option<PathBuf> {
        if let Some(p) = self.vaults.get(alias) {
            return Some(PathBuf::from(p));
        }
        let direct = PathBuf::from(alias);
        if direct.is_dir() {
            return Some(direct);
        }
        None
    }
}

/// Resolve the vault root through the precedence chain: CLI override →
/// `VAULT_PATH` → registry default → CWD marker scan → executable-ancestor
/// scan. Fails with a descriptive error if nothing matches.
pub fn resolve_vault_path(vault_override: Option<&str>) -> Result<PathBuf> {
    if let Some(alias) = vault_override {
        let registry = VaultRegistry::load();
        return registry
            .resolve(alias)
            .with_context(|| format!("unknown vault {alias:?} (not an alias or directory)"));
    }

    if let Ok(v) = std::env::var("VAULT_PATH") {
        if !v.is_empty() {
            return Ok(expand_tilde(&v));
        }
    }

    let registry = VaultRegistry::load();
    if !registry.default.is_empty() {
        if let Some(p) = registry.vaults.get(&registry.default) {
            return Ok(PathBuf::from(p));
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        if has_vault_marker(&cwd) {
            return Ok(cwd);
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        let mut dir = exe.parent().map(Path::to_path_buf);
        for _ in 0..5 {
            match dir {
                Some(d) => {
                    if has_vault_marker(&d) {
                        return Ok(d);
                    }
                    dir = d.parent().map(Path::to_path_buf);
                }
                None => break,
            }
        }
    }

    bail!(
        "no vault found. Set VAULT_PATH, register one with `same vault add`, \
         or run from a directory containing a vault marker ({})",
        VAULT_MARKERS.join(", ")
    )
}

/// True if the directory contains any recognized vault marker.
pub fn has_vault_marker(dir: &Path) -> bool {
    VAULT_MARKERS.iter().any(|m| dir.join(m).exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SameConfig::default();
        assert_eq!(config.embedding.provider, "auto");
        assert_eq!(config.embedding.dim, EMBEDDING_DIM);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.handoff_dir(), "sessions");
        assert_eq!(config.decision_log(), "decisions.md");
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[vault]
handoff_dir = "07_Journal/Sessions"

[embedding]
provider = "none"
dim = 384

[server]
log_level = "debug"
"#;
        let config: SameConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.vault.handoff_dir, "07_Journal/Sessions");
        assert_eq!(config.embedding.provider, "none");
        assert_eq!(config.embedding.dim, 384);
        assert_eq!(config.server.log_level, "debug");
        // defaults still apply for unset fields
        assert_eq!(config.embedding.model, EMBEDDING_MODEL);
    }

    #[test]
    fn skip_dirs_include_private_and_extras() {
        let mut config = SameConfig::default();
        config.vault.extra_skip_dirs = "archive, tmp".into();
        let dirs = config.skip_dirs();
        assert!(dirs.contains(PRIVATE_PREFIX));
        assert!(dirs.contains(".git"));
        assert!(dirs.contains("archive"));
        assert!(dirs.contains("tmp"));
    }

    #[test]
    fn ollama_url_gate_accepts_localhost_forms() {
        for url in [
            "http://localhost:11434",
            "http://127.0.0.1:11434",
            "http://[::1]:11434",
            "http://localhost:11434/",
        ] {
            let mut config = EmbeddingConfig::default();
            config.ollama_url = url.into();
            assert!(config.validated_ollama_url().is_ok(), "rejected {url}");
        }
    }

    #[test]
    fn ollama_url_gate_rejects_remote_hosts() {
        for url in [
            "http://example.com:11434",
            "http://10.0.0.5:11434",
            "https://api.openai.com/v1",
            "not-a-url",
        ] {
            let mut config = EmbeddingConfig::default();
            config.ollama_url = url.into();
            assert!(config.validated_ollama_url().is_err(), "accepted {url}");
        }
    }

    #[test]
    fn url_host_extraction() {
        assert_eq!(url_host("http://localhost:11434").as_deref(), Some("localhost"));
        assert_eq!(url_host("http://[::1]:11434").as_deref(), Some("::1"));
        assert_eq!(url_host("https://api.example.com/v1").as_deref(), Some("api.example.com"));
        assert_eq!(url_host("ftp://x"), None);
    }

    #[test]
    fn registry_roundtrip() {
        let dir = std::env::temp_dir().join(format!("same-registry-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("vaults.json");

        let mut registry = VaultRegistry::default();
        registry.vaults.insert("work".into(), "/tmp/work-vault".into());
        registry.default = "work".into();
        registry.save_to(&path).unwrap();

        let loaded = VaultRegistry::load_from(&path);
        assert_eq!(loaded.default, "work");
        assert_eq!(loaded.vaults.get("work").map(String::as_str), Some("/tmp/work-vault"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn registry_resolves_direct_paths() {
        let registry = VaultRegistry::default();
        let tmp = std::env::temp_dir();
        let resolved = registry.resolve(tmp.to_str().unwrap());
        assert_eq!(resolved, Some(tmp));
        assert!(registry.resolve("no-such-alias-or-dir").is_none());
    }
}
