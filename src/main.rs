use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use same::config::{SameConfig, VaultRegistry};
use same::embedding::{self, EmbeddingProvider};
use same::hooks::{self, HookInput};
use same::indexer::Indexer;
use same::memory::terms;
use same::server;
use same::store::search::SearchOptions;
use same::store::Store;

#[derive(Parser)]
#[command(name = "same", version, about = "Local-first memory engine for AI coding agents")]
struct Cli {
    /// Vault alias or path (overrides VAULT_PATH and the registry default)
    #[arg(long, global = true)]
    vault: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the stdio tool server
    Serve,
    /// Index the vault (incremental by content hash)
    Index {
        /// Reindex everything, ignoring content hashes
        #[arg(long)]
        force: bool,
    },
    /// Search the vault from the command line
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// Run a session-lifecycle hook (reads hook JSON on stdin)
    Hook {
        #[command(subcommand)]
        event: HookEvent,
    },
    /// Manage the vault registry
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },
    /// Pin a note so it always surfaces in context
    Pin { path: String },
    /// Remove a pin
    Unpin { path: String },
    /// List pinned notes
    Pins,
    /// Mark a session's injected context as referenced
    MarkReferenced { session_id: String },
    /// Show index statistics
    Stats,
}

#[derive(Subcommand)]
enum HookEvent {
    /// UserPromptSubmit: surface query-relevant context
    PromptSubmit,
    /// Stop: extract decisions and write a handoff note
    SessionEnd,
    /// SessionStart: surface stale notes and the latest handoff
    SessionStart,
}

#[derive(Subcommand)]
enum VaultAction {
    /// Register a vault under an alias
    Add { alias: String, path: String },
    /// List registered vaults
    List,
    /// Set the default vault
    Use { alias: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Vault registry commands run before vault resolution — they must work
    // with no vault configured at all.
    if let Command::Vault { action } = &cli.command {
        return run_vault_command(action);
    }

    let config = SameConfig::load(cli.vault.as_deref())?;

    // Log to stderr so stdout stays clean for protocol frames and hook
    // output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve_stdio(config).await?,
        // Everything else is synchronous work (rusqlite, blocking reqwest);
        // block_in_place keeps it off the async reactor.
        command => tokio::task::block_in_place(|| run_sync_command(&config, command))?,
    }

    Ok(())
}

fn run_sync_command(config: &SameConfig, command: Command) -> Result<()> {
    match command {
        Command::Index { force } => run_index(config, force)?,
        Command::Search { query, top_k } => run_search(config, &query, top_k)?,
        Command::Hook { event } => run_hook(config, &event)?,
        Command::Pin { path } => {
            open_store(config)?.pin_note(&path)?;
            println!("pinned {path}");
        }
        Command::Unpin { path } => {
            open_store(config)?.unpin_note(&path)?;
            println!("unpinned {path}");
        }
        Command::Pins => {
            for path in open_store(config)?.pinned_paths()? {
                println!("{path}");
            }
        }
        Command::MarkReferenced { session_id } => {
            let marked = open_store(config)?.mark_referenced(&session_id)?;
            println!("marked {marked} injection(s) as referenced");
        }
        Command::Stats => run_stats(config)?,
        Command::Serve | Command::Vault { .. } => unreachable!("handled in main"),
    }
    Ok(())
}

fn open_store(config: &SameConfig) -> Result<Store> {
    Store::open(config.db_path(), config.embedding.dim)
}

fn make_provider(config: &SameConfig) -> Result<Option<Box<dyn EmbeddingProvider>>> {
    embedding::create_provider(&config.embedding)
}

fn run_index(config: &SameConfig, force: bool) -> Result<()> {
    let store = open_store(config)?;
    let provider = make_provider(config)?;
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc_handler(cancel);
    }

    let indexer = Indexer::new(&store, provider.as_deref(), config, cancel);
    let report = indexer.run(force)?;
    println!("{report}");
    Ok(())
}

fn ctrlc_handler(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });
}

fn run_search(config: &SameConfig, query: &str, top_k: usize) -> Result<()> {
    let store = open_store(config)?;
    let provider = make_provider(config)?;

    let hits = match provider {
        Some(provider) => {
            let vec = provider.embed(query, embedding::EmbedRole::Query)?;
            let opts = SearchOptions {
                top_k,
                ..Default::default()
            };
            store.vector_search(&vec, &opts)?
        }
        None => {
            let query_terms = terms::extract_terms(query);
            store.fts_search(&query_terms, top_k)?
        }
    };

    if hits.is_empty() {
        println!("no results");
        return Ok(());
    }
    for hit in hits {
        println!("{:.3}  {}  {}", hit.score, hit.path, hit.title);
    }
    Ok(())
}

fn run_hook(config: &SameConfig, event: &HookEvent) -> Result<()> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("read hook input")?;
    let input: HookInput = serde_json::from_str(&raw).unwrap_or_default();

    let store = open_store(config)?;

    let output = match event {
        HookEvent::PromptSubmit => {
            let provider = make_provider(config)?;
            hooks::prompt_submit(&store, provider.as_deref(), &input)
        }
        HookEvent::SessionEnd => hooks::session_end(&store, config, &input),
        HookEvent::SessionStart => hooks::session_start(&store, &input),
    };

    // No output means no context: print nothing, exit clean.
    if let Some(output) = output {
        println!("{}", serde_json::to_string(&output)?);
    }
    Ok(())
}

fn run_vault_command(action: &VaultAction) -> Result<()> {
    let mut registry = VaultRegistry::load();
    match action {
        VaultAction::Add { alias, path } => {
            let canonical = std::path::Path::new(path)
                .canonicalize()
                .with_context(|| format!("vault path does not exist: {path}"))?;
            registry
                .vaults
                .insert(alias.clone(), canonical.to_string_lossy().into_owned());
            if registry.default.is_empty() {
                registry.default = alias.clone();
            }
            registry.save()?;
            println!("registered {alias} -> {}", canonical.display());
        }
        VaultAction::List => {
            for (alias, path) in &registry.vaults {
                let marker = if *alias == registry.default { "*" } else { " " };
                println!("{marker} {alias}\t{path}");
            }
        }
        VaultAction::Use { alias } => {
            if !registry.vaults.contains_key(alias) {
                anyhow::bail!("unknown vault alias: {alias}");
            }
            registry.default = alias.clone();
            registry.save()?;
            println!("default vault is now {alias}");
        }
    }
    Ok(())
}

fn run_stats(config: &SameConfig) -> Result<()> {
    let store = open_store(config)?;
    println!("vault:        {}", config.vault.path);
    println!("data dir:     {}", config.data_dir().display());
    println!("notes:        {}", store.note_count()?);
    println!("chunks:       {}", store.chunk_count()?);
    match store.last_reindex()? {
        Some(secs) => {
            let when = chrono::DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| secs.to_string());
            println!("last reindex: {when}");
        }
        None => println!("last reindex: never"),
    }
    Ok(())
}
