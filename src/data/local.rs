//! In-process cache backed by a `DashMap`.

use super::source::{sort_snapshot, LocalSource};
use super::types::CoinRecord;
use crate::error::{FeedError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct MemoryLocalSource {
    records: Arc<DashMap<String, CoinRecord>>,
    data_tx: broadcast::Sender<Vec<CoinRecord>>,
    error_tx: broadcast::Sender<String>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicU64>,
}

impl MemoryLocalSource {
    pub fn new(channel_capacity: usize) -> Self {
        let (data_tx, _) = broadcast::channel(channel_capacity.max(1));
        let (error_tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            records: Arc::new(DashMap::new()),
            data_tx,
            error_tx,
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Pre-populates the cache without emitting a change notification.
    pub fn seed(&self, records: Vec<CoinRecord>) {
        for record in records {
            self.records.insert(record.id.clone(), record);
        }
    }

    pub fn snapshot(&self) -> Vec<CoinRecord> {
        let mut records: Vec<CoinRecord> =
            self.records.iter().map(|entry| entry.value().clone()).collect();
        sort_snapshot(&mut records);
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of successful `write` calls.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Publishes a failure on the error stream, as a storage engine would.
    pub fn report_error(&self, message: &str) {
        if self.error_tx.send(message.to_string()).is_err() {
            debug!("Local error dropped: no error subscribers");
        }
    }

    fn fail(&self, message: &str) -> FeedError {
        warn!("Memory cache failure: {}", message);
        self.report_error(message);
        FeedError::Local(message.to_string())
    }
}

#[async_trait]
impl LocalSource for MemoryLocalSource {
    fn data_stream(&self) -> broadcast::Receiver<Vec<CoinRecord>> {
        self.data_tx.subscribe()
    }

    fn error_stream(&self) -> broadcast::Receiver<String> {
        self.error_tx.subscribe()
    }

    async fn read_all(&self) -> Result<Vec<CoinRecord>> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(self.fail("cache read failed"));
        }
        Ok(self.snapshot())
    }

    async fn write(&self, records: Vec<CoinRecord>) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(self.fail("cache write failed"));
        }
        let count = records.len();
        self.seed(records);
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!("Memory cache upserted {} records ({} total)", count, self.len());

        // Change notification carries the full cache, like a table observer.
        if self.data_tx.send(self.snapshot()).is_err() {
            debug!("Local change notification dropped: no data subscribers");
        }
        Ok(())
    }
}
