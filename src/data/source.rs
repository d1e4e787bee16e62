//! Capability interfaces consumed by the merge coordinator.
//!
//! Both sources publish through `tokio::sync::broadcast`, so any number of
//! consumers can subscribe and a slow consumer only loses its own messages.

use super::types::CoinRecord;
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Live provider of ticker batches.
pub trait RemoteSource: Send + Sync {
    /// Triggers a fetch. Returns immediately; the outcome arrives on
    /// `data_stream` or `error_stream`.
    fn fetch(&self);

    fn data_stream(&self) -> broadcast::Receiver<Vec<CoinRecord>>;

    fn error_stream(&self) -> broadcast::Receiver<String>;
}

/// Durable cache of the last known ticker batch.
#[async_trait]
pub trait LocalSource: Send + Sync {
    /// Change notifications: full cache snapshot after each write.
    fn data_stream(&self) -> broadcast::Receiver<Vec<CoinRecord>>;

    fn error_stream(&self) -> broadcast::Receiver<String>;

    async fn read_all(&self) -> Result<Vec<CoinRecord>>;

    async fn write(&self, records: Vec<CoinRecord>) -> Result<()>;
}

/// Orders a cache snapshot the way the ticker does: by rank, then id.
/// Unranked (rank 0) entries go last.
pub fn sort_snapshot(records: &mut [CoinRecord]) {
    records.sort_by(|a, b| {
        let rank = |r: &CoinRecord| if r.rank == 0 { u32::MAX } else { r.rank };
        rank(a).cmp(&rank(b)).then_with(|| a.id.cmp(&b.id))
    });
}
