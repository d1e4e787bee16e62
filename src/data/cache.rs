//! Redis-backed durable cache for ticker batches.

use super::source::{sort_snapshot, LocalSource};
use super::types::CoinRecord;
use crate::config::Config;
use crate::error::{FeedError, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{broadcast, Mutex};

/// Cached coins stored as one JSON object (id -> record) under a single key.
/// Uses a `ConnectionManager` for automatic reconnection.
pub struct RedisLocalSource {
    conn_manager: ConnectionManager,
    redis_url: String,
    key: String,
    ttl_secs: u64,
    data_tx: broadcast::Sender<Vec<CoinRecord>>,
    error_tx: broadcast::Sender<String>,
    // Serializes read-modify-write cycles from this process.
    write_lock: Mutex<()>,
}

impl fmt::Debug for RedisLocalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisLocalSource")
            .field("redis_url", &self.redis_url)
            .field("key", &self.key)
            .field("ttl_secs", &self.ttl_secs)
            .field("conn_manager", &"<ConnectionManager instance>")
            .finish()
    }
}

impl RedisLocalSource {
    pub async fn new(
        redis_url: &str,
        key: &str,
        ttl_secs: u64,
        channel_capacity: usize,
    ) -> Result<Self> {
        info!("Initializing Redis connection manager for URL: {}", redis_url);
        let client = redis::Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to create Redis ConnectionManager: {}", e);
            FeedError::Cache(format!("Failed to create Redis ConnectionManager: {}", e))
        })?;
        info!(
            "Redis ConnectionManager initialized successfully. Key: {}, TTL: {}s",
            key, ttl_secs
        );

        let (data_tx, _) = broadcast::channel(channel_capacity.max(1));
        let (error_tx, _) = broadcast::channel(channel_capacity.max(1));
        Ok(Self {
            conn_manager,
            redis_url: redis_url.to_string(),
            key: key.to_string(),
            ttl_secs,
            data_tx,
            error_tx,
            write_lock: Mutex::new(()),
        })
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let redis_url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| FeedError::Config("REDIS_URL is not set".to_string()))?;
        Self::new(
            redis_url,
            &config.redis_cache_key,
            config.redis_default_ttl_secs,
            config.stream_channel_capacity,
        )
        .await
    }

    async fn load(&self) -> Result<HashMap<String, CoinRecord>> {
        let mut conn = self.conn_manager.clone();
        match conn.get::<_, Option<String>>(&self.key).await? {
            Some(value_str) => {
                debug!("Cache HIT for key: {}", self.key);
                serde_json::from_str(&value_str).map_err(|e| {
                    warn!("Failed to deserialize cached JSON for key {}: {}", self.key, e);
                    FeedError::from(e)
                })
            }
            None => {
                debug!("Cache MISS for key: {}", self.key);
                Ok(HashMap::new())
            }
        }
    }

    async fn store(&self, entries: &HashMap<String, CoinRecord>) -> Result<()> {
        let value_str = serde_json::to_string(entries)?;
        let mut conn = self.conn_manager.clone();
        conn.set_ex::<_, _, ()>(&self.key, value_str, self.ttl_secs)
            .await?;
        debug!("Cache SETEX success for key: {} with TTL: {}s", self.key, self.ttl_secs);
        Ok(())
    }

    fn report(&self, err: FeedError) -> FeedError {
        let local = FeedError::Local(err.to_string());
        warn!("Redis cache failure: {}", local);
        if self.error_tx.send(local.to_string()).is_err() {
            debug!("Local error dropped: no error subscribers");
        }
        local
    }
}

/// Upserts `records` into `entries` by id and returns the ordered snapshot.
fn merge_records(entries: &mut HashMap<String, CoinRecord>, records: Vec<CoinRecord>) -> Vec<CoinRecord> {
    for record in records {
        entries.insert(record.id.clone(), record);
    }
    into_snapshot(entries)
}

fn into_snapshot(entries: &HashMap<String, CoinRecord>) -> Vec<CoinRecord> {
    let mut snapshot: Vec<CoinRecord> = entries.values().cloned().collect();
    sort_snapshot(&mut snapshot);
    snapshot
}

#[async_trait]
impl LocalSource for RedisLocalSource {
    fn data_stream(&self) -> broadcast::Receiver<Vec<CoinRecord>> {
        self.data_tx.subscribe()
    }

    fn error_stream(&self) -> broadcast::Receiver<String> {
        self.error_tx.subscribe()
    }

    async fn read_all(&self) -> Result<Vec<CoinRecord>> {
        match self.load().await {
            Ok(entries) => Ok(into_snapshot(&entries)),
            Err(e) => Err(self.report(e)),
        }
    }

    async fn write(&self, records: Vec<CoinRecord>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await.map_err(|e| self.report(e))?;
        let snapshot = merge_records(&mut entries, records);
        self.store(&entries).await.map_err(|e| self.report(e))?;

        if self.data_tx.send(snapshot).is_err() {
            debug!("Local change notification dropped: no data subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merge_records_upserts_by_id() {
        let mut entries = HashMap::new();
        merge_records(
            &mut entries,
            vec![CoinRecord::new("btc", "BTC", 100.0), CoinRecord::new("eth", "ETH", 50.0)],
        );
        let snapshot = merge_records(&mut entries, vec![CoinRecord::new("btc", "BTC", 90.0)]);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(entries["btc"].market_cap_usd, 90.0);
        assert_eq!(entries["eth"].market_cap_usd, 50.0);
    }

    #[test]
    fn test_cached_json_roundtrip_shape() {
        let mut entries = HashMap::new();
        merge_records(&mut entries, vec![CoinRecord::new("btc", "BTC", 100.0)]);
        let json = serde_json::to_string(&entries).unwrap();
        let back: HashMap<String, CoinRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entries);
    }

    #[tokio::test]
    async fn test_from_config_requires_redis_url() {
        let err = RedisLocalSource::from_config(&Config::test_default())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Config(_)));
    }
}
