use crate::storage::Database;
use crate::types::{now_ts, IngestCursor};
use anyhow::Result;
use tracing::debug;

/// Tracks the per-account incremental sync watermark. The watermark is an
/// opaque provider token; it is recorded after each successful pass so a
/// future history-based sync can pick up from it.
pub struct CursorTracker {
    db: Database,
}

impl CursorTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, account_id: &str) -> Result<Option<IngestCursor>> {
        self.db.get_cursor(account_id).await
    }

    pub async fn record(&self, account_id: &str, watermark: &str) -> Result<()> {
        debug!(account = %account_id, watermark, "Advancing ingest cursor");
        self.db.advance_cursor(account_id, watermark, now_ts()).await
    }
}
