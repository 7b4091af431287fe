//! Prints entries as JSON lines.

use std::io::Write;

use anyhow::Context;
use pipeline::Entry;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub fn write_json_line<W: Write>(out: &mut W, entry: &Entry) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, entry).context("Failed to encode entry")?;
    out.write_all(b"\n").context("Failed to write entry")?;
    Ok(())
}

/// Drains `entries` to stdout until every sender is dropped.
///
/// Returns the number of entries written.
pub fn spawn_json_lines_sink(entries: mpsc::Receiver<Entry>) -> JoinHandle<anyhow::Result<u64>> {
    tokio::spawn(drain_json_lines(entries, tokio::io::stdout()))
}

async fn drain_json_lines<W: AsyncWrite + Unpin>(
    mut entries: mpsc::Receiver<Entry>,
    mut out: W,
) -> anyhow::Result<u64> {
    let mut written = 0;
    let mut line = Vec::new();
    while let Some(entry) = entries.recv().await {
        line.clear();
        write_json_line(&mut line, &entry)?;
        out.write_all(&line).await.context("Failed to write entry")?;
        out.flush().await.context("Failed to flush output")?;
        written += 1;
    }
    tracing::debug!("sink drained after {} entries", written);
    Ok(written)
}
