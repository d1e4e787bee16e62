//! Merge-fallback coordinator.
//!
//! Fans the remote and local sources into one merged data stream and one
//! merged error stream. Remote batches are written through to the cache;
//! remote errors fall back to whatever the cache currently holds.

pub mod metrics;
pub mod worker_pool;

pub use metrics::{CoordinatorMetrics, MetricsSnapshot};
pub use worker_pool::WorkerPool;

use crate::data::{total_market_cap, CoinMapper, CoinRecord, CoinView, LocalSource, RemoteSource};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub worker_pool_size: usize,
    pub channel_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 5,
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Default)]
struct PublishedState {
    data: Option<Vec<CoinView>>,
    error: Option<String>,
    total_market_cap: f64,
}

struct Shared {
    remote: Arc<dyn RemoteSource>,
    local: Arc<dyn LocalSource>,
    mapper: CoinMapper,
    pool: WorkerPool,
    data_tx: broadcast::Sender<Vec<CoinView>>,
    error_tx: broadcast::Sender<String>,
    cap_tx: broadcast::Sender<f64>,
    state: Mutex<PublishedState>,
    metrics: CoordinatorMetrics,
}

pub struct MergeCoordinator {
    shared: Arc<Shared>,
    subscriptions: Mutex<Vec<JoinHandle<()>>>,
}

impl MergeCoordinator {
    /// Subscribes to both sources and starts merging. Must be called from
    /// within a tokio runtime.
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        local: Arc<dyn LocalSource>,
        mapper: CoinMapper,
        config: CoordinatorConfig,
    ) -> Self {
        let capacity = config.channel_capacity.max(1);
        let (data_tx, _) = broadcast::channel(capacity);
        let (error_tx, _) = broadcast::channel(capacity);
        let (cap_tx, _) = broadcast::channel(capacity);

        // Subscribe before spawning so nothing emitted after `new` is missed.
        let remote_data = remote.data_stream();
        let remote_errors = remote.error_stream();
        let local_data = local.data_stream();
        let local_errors = local.error_stream();

        let shared = Arc::new(Shared {
            remote,
            local,
            mapper,
            pool: WorkerPool::new(config.worker_pool_size),
            data_tx,
            error_tx,
            cap_tx,
            state: Mutex::new(PublishedState::default()),
            metrics: CoordinatorMetrics::default(),
        });

        let subscriptions = vec![
            subscribe("remote data", remote_data, &shared, Shared::on_remote_batch),
            subscribe("local data", local_data, &shared, Shared::on_local_batch),
            subscribe("remote errors", remote_errors, &shared, Shared::on_remote_error),
            subscribe("local errors", local_errors, &shared, Shared::on_local_error),
        ];

        info!(
            "Merge coordinator started ({} workers, channel capacity {})",
            shared.pool.size(),
            capacity
        );
        Self {
            shared,
            subscriptions: Mutex::new(subscriptions),
        }
    }

    /// Asks the remote source to refresh. Results arrive on the merged streams.
    pub fn fetch_data(&self) {
        debug!("Fetch requested");
        self.shared.remote.fetch();
    }

    pub fn data_stream(&self) -> broadcast::Receiver<Vec<CoinView>> {
        self.shared.data_tx.subscribe()
    }

    pub fn error_stream(&self) -> broadcast::Receiver<String> {
        self.shared.error_tx.subscribe()
    }

    /// One value per merged data emission: the sum of its market caps.
    pub fn total_market_cap_stream(&self) -> broadcast::Receiver<f64> {
        self.shared.cap_tx.subscribe()
    }

    pub fn total_market_cap(&self) -> f64 {
        self.shared.lock_state().total_market_cap
    }

    pub fn latest_data(&self) -> Option<Vec<CoinView>> {
        self.shared.lock_state().data.clone()
    }

    pub fn latest_error(&self) -> Option<String> {
        self.shared.lock_state().error.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn worker_pool(&self) -> &WorkerPool {
        &self.shared.pool
    }

    /// Stops listening to both sources. Work already queued on the pool
    /// still runs to completion.
    pub fn shutdown(&self) {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if subscriptions.is_empty() {
            return;
        }
        for handle in subscriptions.drain(..) {
            handle.abort();
        }
        info!("Merge coordinator shut down");
    }
}

impl Drop for MergeCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn subscribe<T, F>(
    name: &'static str,
    mut rx: broadcast::Receiver<T>,
    shared: &Arc<Shared>,
    handler: F,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: Fn(&Arc<Shared>, T) + Send + 'static,
{
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(item) => handler(&shared, item),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscription '{}' lagged, skipped {} messages", name, skipped);
                    shared
                        .metrics
                        .lagged_messages
                        .fetch_add(skipped, std::sync::atomic::Ordering::Relaxed);
                }
                Err(RecvError::Closed) => {
                    info!("Subscription '{}' closed", name);
                    break;
                }
            }
        }
    })
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, PublishedState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn on_remote_batch(self: &Arc<Self>, batch: Vec<CoinRecord>) {
        debug!("Remote batch received ({} records)", batch.len());
        CoordinatorMetrics::incr(&self.metrics.remote_batches);

        // Write-through is detached: publishing never waits on the cache.
        if !batch.is_empty() {
            let shared = Arc::clone(self);
            let records = batch.clone();
            self.pool.spawn(async move {
                if let Err(e) = shared.local.write(records).await {
                    warn!("Cache write failed: {}", e);
                    CoordinatorMetrics::incr(&shared.metrics.cache_writes_failed);
                }
            });
        }

        let shared = Arc::clone(self);
        self.pool.spawn(async move {
            let views = shared.mapper.map_batch(&batch);
            shared.publish_data(views);
        });
    }

    fn on_local_batch(self: &Arc<Self>, batch: Vec<CoinRecord>) {
        debug!("Local batch received ({} records)", batch.len());
        CoordinatorMetrics::incr(&self.metrics.local_batches);

        let shared = Arc::clone(self);
        self.pool.spawn(async move {
            let views = shared.mapper.map_batch(&batch);
            shared.publish_data(views);
        });
    }

    fn on_remote_error(self: &Arc<Self>, message: String) {
        CoordinatorMetrics::incr(&self.metrics.remote_errors);
        self.publish_error(message);

        info!("Remote error, falling back to local cache");
        let shared = Arc::clone(self);
        self.pool.spawn(async move {
            match shared.local.read_all().await {
                Ok(records) => {
                    CoordinatorMetrics::incr(&shared.metrics.fallbacks_served);
                    debug!("Fallback read {} cached records", records.len());
                    let views = shared.mapper.map_batch(&records);
                    shared.publish_data(views);
                }
                Err(e) => {
                    CoordinatorMetrics::incr(&shared.metrics.fallbacks_dropped);
                    warn!("Fallback read failed, keeping last merged data: {}", e);
                }
            }
        });
    }

    fn on_local_error(self: &Arc<Self>, message: String) {
        CoordinatorMetrics::incr(&self.metrics.local_errors);
        self.publish_error(message);
    }

    /// Publishes a batch and its market cap as one step, so the cap stream
    /// always follows the data emission it was computed from.
    fn publish_data(&self, views: Vec<CoinView>) {
        let total = total_market_cap(&views);
        let mut state = self.lock_state();
        state.data = Some(views.clone());
        state.total_market_cap = total;

        if self.data_tx.send(views).is_err() {
            debug!("Merged batch has no subscribers");
        }
        if self.cap_tx.send(total).is_err() {
            debug!("Market cap has no subscribers");
        }
        CoordinatorMetrics::incr(&self.metrics.data_published);
    }

    fn publish_error(&self, message: String) {
        let mut state = self.lock_state();
        state.error = Some(message.clone());

        if self.error_tx.send(message).is_err() {
            debug!("Merged error has no subscribers");
        }
        CoordinatorMetrics::incr(&self.metrics.errors_published);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MemoryLocalSource;
    use std::time::Duration;

    struct ChannelRemote {
        data_tx: broadcast::Sender<Vec<CoinRecord>>,
        error_tx: broadcast::Sender<String>,
        fetches: std::sync::atomic::AtomicUsize,
    }

    impl ChannelRemote {
        fn new() -> Self {
            Self {
                data_tx: broadcast::channel(16).0,
                error_tx: broadcast::channel(16).0,
                fetches: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    impl RemoteSource for ChannelRemote {
        fn fetch(&self) {
            self.fetches
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }

        fn data_stream(&self) -> broadcast::Receiver<Vec<CoinRecord>> {
            self.data_tx.subscribe()
        }

        fn error_stream(&self) -> broadcast::Receiver<String> {
            self.error_tx.subscribe()
        }
    }

    async fn next<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for emission")
            .expect("stream closed")
    }

    fn setup() -> (Arc<ChannelRemote>, MemoryLocalSource, MergeCoordinator) {
        let remote = Arc::new(ChannelRemote::new());
        let local = MemoryLocalSource::new(16);
        let coordinator = MergeCoordinator::new(
            remote.clone(),
            Arc::new(local.clone()),
            CoinMapper::default(),
            CoordinatorConfig::default(),
        );
        (remote, local, coordinator)
    }

    #[tokio::test]
    async fn test_fetch_data_delegates_to_remote() {
        let (remote, _local, coordinator) = setup();
        coordinator.fetch_data();
        coordinator.fetch_data();
        assert_eq!(remote.fetches.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_publishes_zero_cap_without_write() {
        let (remote, local, coordinator) = setup();
        let mut data = coordinator.data_stream();
        let mut caps = coordinator.total_market_cap_stream();

        remote.data_tx.send(vec![]).unwrap();

        assert!(next(&mut data).await.is_empty());
        assert_eq!(next(&mut caps).await, 0.0);
        assert_eq!(local.write_count(), 0);
        assert_eq!(coordinator.latest_data(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_latest_error_tracks_last_message() {
        let (remote, local, coordinator) = setup();
        let mut errors = coordinator.error_stream();

        remote.error_tx.send("timeout".to_string()).unwrap();
        assert_eq!(next(&mut errors).await, "timeout");
        local.report_error("disk full");
        assert_eq!(next(&mut errors).await, "disk full");

        assert_eq!(coordinator.latest_error().as_deref(), Some("disk full"));
        let metrics = coordinator.metrics();
        assert_eq!(metrics.remote_errors, 1);
        assert_eq!(metrics.local_errors, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_merging() {
        let (remote, _local, coordinator) = setup();
        let mut errors = coordinator.error_stream();
        coordinator.shutdown();
        tokio::task::yield_now().await;

        // Subscriptions are gone, so nothing reaches the merged stream.
        let _ = remote.error_tx.send("late".to_string());
        let result = tokio::time::timeout(Duration::from_millis(100), errors.recv()).await;
        assert!(result.is_err());
        assert_eq!(coordinator.metrics().remote_errors, 0);
    }
}
