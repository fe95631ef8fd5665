//! Persistence hook for scrape results.

use async_trait::async_trait;
use serde_json::Value;
use threadscope_core::Result;

/// Receives a snapshot after every successful scrape.
///
/// Snapshots are delivered in the background; a failing sink is logged and
/// never affects the scrape that produced the snapshot.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Persist one snapshot. `kind` is `profile`, `posts` or `profile_with_posts`.
    async fn record(&self, kind: &str, snapshot: Value) -> Result<()>;
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl SnapshotSink for NoopSink {
    async fn record(&self, _kind: &str, _snapshot: Value) -> Result<()> {
        Ok(())
    }
}
