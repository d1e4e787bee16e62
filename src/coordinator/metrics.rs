use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    pub remote_batches: AtomicU64,
    pub local_batches: AtomicU64,
    pub remote_errors: AtomicU64,
    pub local_errors: AtomicU64,
    pub fallbacks_served: AtomicU64,
    pub fallbacks_dropped: AtomicU64,
    pub cache_writes_failed: AtomicU64,
    pub data_published: AtomicU64,
    pub errors_published: AtomicU64,
    pub lagged_messages: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub remote_batches: u64,
    pub local_batches: u64,
    pub remote_errors: u64,
    pub local_errors: u64,
    pub fallbacks_served: u64,
    pub fallbacks_dropped: u64,
    pub cache_writes_failed: u64,
    pub data_published: u64,
    pub errors_published: u64,
    pub lagged_messages: u64,
}

impl CoordinatorMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            remote_batches: load(&self.remote_batches),
            local_batches: load(&self.local_batches),
            remote_errors: load(&self.remote_errors),
            local_errors: load(&self.local_errors),
            fallbacks_served: load(&self.fallbacks_served),
            fallbacks_dropped: load(&self.fallbacks_dropped),
            cache_writes_failed: load(&self.cache_writes_failed),
            data_published: load(&self.data_published),
            errors_published: load(&self.errors_published),
            lagged_messages: load(&self.lagged_messages),
        }
    }
}
