//! Stdio tool server.
//!
//! Reads one JSON request per line from stdin, dispatches it, and writes
//! one JSON response per line to stdout. Diagnostics go to stderr via
//! tracing, so stdout carries nothing but protocol frames. Ctrl-C sets
//! the shared cancellation flag and drains the loop.

pub mod paths;
pub mod protocol;
pub mod rate_limit;
pub mod tools;

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::SameConfig;
use crate::embedding;
use crate::store::Store;
use protocol::{Request, Response, ToolError};
use tools::SameTools;

/// Open the store and embedding provider and wire them into a tools
/// handler.
fn setup_shared_state(config: SameConfig) -> Result<(Arc<SameTools>, Arc<AtomicBool>)> {
    let store = Store::open(config.db_path(), config.embedding.dim)
        .context("open vault database")?;

    let provider = embedding::create_provider(&config.embedding)?;
    match &provider {
        Some(p) => tracing::info!(model = p.model_name(), dims = p.dims(), "embedding provider ready"),
        None => tracing::info!("embedding disabled, keyword retrieval only"),
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let tools = SameTools::new(
        Arc::new(store),
        provider.map(Arc::from),
        Arc::new(config),
        Arc::clone(&cancel),
    );
    Ok((Arc::new(tools), cancel))
}

/// Run the tool server until stdin closes or the process is interrupted.
pub async fn serve_stdio(config: SameConfig) -> Result<()> {
    tracing::info!(vault = %config.vault.path, "starting SAME tool server on stdio");
    // Store open and provider construction are blocking (disk, DNS).
    let (tools, cancel) = tokio::task::block_in_place(|| setup_shared_state(config))?;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::Relaxed);
                let _ = shutdown_tx.send(true);
            }
        });
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("read stdin")?,
            _ = shutdown_rx.changed() => {
                tracing::info!("interrupt received, shutting down");
                break;
            }
        };
        let Some(line) = line else {
            break; // stdin closed
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                if cancel.load(Ordering::Relaxed) {
                    Response::err(request.id, ToolError::cancelled())
                } else {
                    handle_request(&tools, request).await
                }
            }
            Err(err) => Response::err(
                serde_json::Value::Null,
                ToolError::invalid_argument(format!("malformed request: {err}")),
            ),
        };

        let mut frame = response.to_line();
        frame.push('\n');
        stdout
            .write_all(frame.as_bytes())
            .await
            .context("write stdout")?;
        stdout.flush().await.context("flush stdout")?;
    }

    tracing::info!("tool server stopped");
    Ok(())
}

/// Dispatch one request on the blocking pool (DB and embedding calls are
/// synchronous).
async fn handle_request(tools: &Arc<SameTools>, request: Request) -> Response {
    let id = request.id.clone();
    let tools = Arc::clone(tools);

    let result = tokio::task::spawn_blocking(move || {
        tools.dispatch(&request.method, &request.arguments)
    })
    .await;

    match result {
        Ok(Ok(value)) => Response::ok(id, value),
        Ok(Err(tool_err)) => Response::err(id, tool_err),
        Err(join_err) => Response::err(
            id,
            ToolError::internal(format!("dispatch task failed: {join_err}")),
        ),
    }
}
