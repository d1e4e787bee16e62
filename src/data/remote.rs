//! HTTP ticker client.

use super::mapper::CoinMapper;
use super::source::RemoteSource;
use super::types::CoinRecord;
use crate::config::Config;
use crate::error::{FeedError, Result, RetryPolicy};
use crate::utils::now_unix_secs;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

pub struct HttpRemoteSource {
    inner: Arc<Inner>,
}

struct Inner {
    client: reqwest::Client,
    url: String,
    limit: usize,
    mapper: CoinMapper,
    retry_policy: RetryPolicy,
    data_tx: broadcast::Sender<Vec<CoinRecord>>,
    error_tx: broadcast::Sender<String>,
}

impl HttpRemoteSource {
    pub fn new(
        url: &str,
        limit: usize,
        timeout: Duration,
        retry_policy: RetryPolicy,
        mapper: CoinMapper,
        channel_capacity: usize,
    ) -> Result<Self> {
        url::Url::parse(url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let (data_tx, _) = broadcast::channel(channel_capacity.max(1));
        let (error_tx, _) = broadcast::channel(channel_capacity.max(1));

        info!("HTTP remote source targeting {} (limit {})", url, limit);
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                url: url.to_string(),
                limit,
                mapper,
                retry_policy,
                data_tx,
                error_tx,
            }),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.api_url,
            config.api_limit,
            config.request_timeout(),
            config.retry_policy(),
            CoinMapper::new(&config.icon_base_url),
            config.stream_channel_capacity,
        )
    }

    /// Fetches and parses one ticker batch, retrying transport failures.
    pub async fn fetch_once(&self) -> Result<Vec<CoinRecord>> {
        self.inner.fetch_with_retry().await
    }
}

impl Inner {
    async fn fetch_with_retry(&self) -> Result<Vec<CoinRecord>> {
        let started = Instant::now();
        let records = self
            .retry_policy
            .execute(|| self.request_ticker())
            .await?;
        debug!(
            "Fetched {} ticker entries in {:?}",
            records.len(),
            started.elapsed()
        );
        Ok(records)
    }

    async fn request_ticker(&self) -> Result<Vec<CoinRecord>> {
        let payload: serde_json::Value = self
            .client
            .get(&self.url)
            .query(&[("limit", self.limit)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let mut records = self.mapper.parse_ticker(&payload)?;

        let fetched_at = now_unix_secs();
        for record in records.iter_mut().filter(|r| r.last_updated == 0) {
            record.last_updated = fetched_at;
        }
        Ok(records)
    }

    fn publish(&self, outcome: Result<Vec<CoinRecord>>) {
        match outcome {
            Ok(records) => {
                if self.data_tx.send(records).is_err() {
                    debug!("Remote batch dropped: no data subscribers");
                }
            }
            Err(e) => {
                let remote = FeedError::Remote(e.to_string());
                error!("Remote fetch failed: {}", remote);
                if self.error_tx.send(remote.to_string()).is_err() {
                    debug!("Remote error dropped: no error subscribers");
                }
            }
        }
    }
}

impl RemoteSource for HttpRemoteSource {
    fn fetch(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = inner.fetch_with_retry().await;
            inner.publish(outcome);
        });
    }

    fn data_stream(&self) -> broadcast::Receiver<Vec<CoinRecord>> {
        self.inner.data_tx.subscribe()
    }

    fn error_stream(&self) -> broadcast::Receiver<String> {
        self.inner.error_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const WAIT: Duration = Duration::from_secs(5);

    enum Reply {
        /// Accept the connection and never answer.
        Silent,
        Respond(&'static str, &'static str),
    }

    /// Serves every connection on a loopback port with the same reply.
    /// Returns the ticker URL and a counter of accepted connections.
    async fn serve(reply: Reply) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/ticker/", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                match &reply {
                    Reply::Silent => held.push(socket),
                    Reply::Respond(status, body) => {
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                }
            }
        });

        (url, hits)
    }

    fn client_for(url: &str, max_attempts: u32) -> HttpRemoteSource {
        HttpRemoteSource::new(
            url,
            10,
            Duration::from_millis(150),
            RetryPolicy::new(max_attempts, Duration::from_millis(10), Duration::from_millis(10)),
            CoinMapper::default(),
            8,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_url() {
        let result = HttpRemoteSource::new(
            "::not a url::",
            10,
            Duration::from_millis(100),
            RetryPolicy::none(),
            CoinMapper::default(),
            8,
        );
        assert!(matches!(result, Err(FeedError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_emits_error() {
        // Port 9 (discard) on loopback refuses connections on a normal host.
        let source = HttpRemoteSource::from_config(&Config::test_default()).unwrap();
        let mut errors = source.error_stream();
        let mut data = source.data_stream();

        source.fetch();

        let err = tokio::time::timeout(WAIT, errors.recv())
            .await
            .expect("error not emitted in time")
            .unwrap();
        assert!(!err.is_empty());
        assert!(data.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_silent_server_reports_timeout_after_all_attempts() {
        let (url, hits) = serve(Reply::Silent).await;
        let source = client_for(&url, 2);
        let mut errors = source.error_stream();
        let mut data = source.data_stream();

        source.fetch();

        let err = tokio::time::timeout(WAIT, errors.recv())
            .await
            .expect("error not emitted in time")
            .unwrap();
        assert_eq!(err, "timeout");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(data.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (url, hits) = serve(Reply::Respond("404 Not Found", "")).await;
        let source = client_for(&url, 3);
        let mut errors = source.error_stream();

        source.fetch();

        let err = tokio::time::timeout(WAIT, errors.recv())
            .await
            .expect("error not emitted in time")
            .unwrap();
        assert!(err.starts_with("Non-Recoverable Error: HTTP 404"), "{}", err);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_not_retried() {
        let (url, hits) = serve(Reply::Respond("200 OK", r#"{"error":"rate limited"}"#)).await;
        let source = client_for(&url, 3);

        let err = source.fetch_once().await.unwrap_err();

        assert!(matches!(err, FeedError::Parse(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_successful_response_emits_parsed_batch() {
        let body = r#"[{"id":"bitcoin","name":"Bitcoin","symbol":"BTC","rank":"1","price_usd":"100.0","market_cap_usd":"1000"}]"#;
        let (url, hits) = serve(Reply::Respond("200 OK", body)).await;
        let source = client_for(&url, 2);
        let mut data = source.data_stream();
        let mut errors = source.error_stream();

        source.fetch();

        let batch = tokio::time::timeout(WAIT, data.recv())
            .await
            .expect("batch not emitted in time")
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, "bitcoin");
        assert_eq!(batch[0].rank, 1);
        assert_eq!(batch[0].market_cap_usd, 1000.0);
        assert!(batch[0].last_updated > 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fetch_once_keeps_reported_timestamp() {
        let body = r#"[{"id":"ethereum","symbol":"ETH","rank":2,"market_cap_usd":500,"last_updated":"1700000000"}]"#;
        let (url, _) = serve(Reply::Respond("200 OK", body)).await;

        let records = client_for(&url, 1).fetch_once().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "ETH");
        assert_eq!(records[0].last_updated, 1_700_000_000);
    }
}
