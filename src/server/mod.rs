//! The markdown document provider served over stdio.

pub mod handlers;
pub mod store;

use std::error::Error;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::server::handlers::MarkdownHandler;
use crate::server::store::MarkdownStore;

/// Serves the provider on stdin/stdout until EOF. All diagnostics go to
/// stderr; stdout carries only protocol frames.
pub async fn serve(root: PathBuf) -> Result<(), Box<dyn Error>> {
    let store = MarkdownStore::open(root)?;
    info!(root = %store.root().display(), "Markdown provider serving on stdio");
    let handler = MarkdownHandler::new(store);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = handler.handle_line(&line) {
            let payload = serde_json::to_string(&response)?;
            stdout.write_all(payload.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }
    info!("stdin closed, shutting down");
    Ok(())
}
