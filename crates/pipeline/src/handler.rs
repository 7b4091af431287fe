use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::entry::Entry;
use crate::error::{PipelineError, Result};

/// Receives processed entries.
///
/// `handle` may wait for capacity; callers must not read further input until
/// it returns, so a slow sink slows down consumption instead of buffering.
#[async_trait]
pub trait EntryHandler: Send + Sync {
    async fn handle(&self, entry: Entry) -> Result<()>;
}

#[async_trait]
impl EntryHandler for mpsc::Sender<Entry> {
    async fn handle(&self, entry: Entry) -> Result<()> {
        self.send(entry).await.map_err(|_| PipelineError::SinkClosed)
    }
}
