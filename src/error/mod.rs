use log::{debug, error, info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeedError {
    /// Failure reported by the remote ticker source
    #[error("{0}")]
    Remote(String),

    /// Failure reported by the local cache source
    #[error("{0}")]
    Local(String),

    /// Network/connectivity issues
    #[error("Network Error: {0}")]
    Network(String),

    /// Request or operation timed out
    #[error("timeout")]
    Timeout,

    /// Malformed ticker payload or cached JSON
    #[error("Parse Error: {0}")]
    Parse(String),

    /// Redis/cache backend errors
    #[error("Cache Error: {0}")]
    Cache(String),

    /// Configuration errors
    #[error("Config Error: {0}")]
    Config(String),

    /// Errors that should not be retried
    #[error("Non-Recoverable Error: {0}")]
    NonRecoverable(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Parse(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return FeedError::Timeout;
        }
        if err.is_decode() {
            return FeedError::Parse(format!("Response body error: {}", err));
        }
        match err.status() {
            Some(status) if status.is_client_error() => {
                FeedError::NonRecoverable(format!("HTTP {}: {}", status, err))
            }
            _ => FeedError::Network(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for FeedError {
    fn from(err: redis::RedisError) -> Self {
        FeedError::Cache(err.to_string())
    }
}

impl From<url::ParseError> for FeedError {
    fn from(err: url::ParseError) -> Self {
        FeedError::Config(format!("Invalid URL: {}", err))
    }
}

impl FeedError {
    /// Determines if an error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            FeedError::Remote(_) => true,
            FeedError::Local(_) => true,
            FeedError::Network(_) => true,
            FeedError::Timeout => true,
            FeedError::Parse(_) => false, // Data format issues aren't recoverable
            FeedError::Cache(_) => true,  // Redis might recover
            FeedError::Config(_) => false,
            FeedError::NonRecoverable(_) => false,
        }
    }

    /// Determines if operation should be retried immediately
    pub fn should_retry(&self) -> bool {
        self.is_recoverable()
            && matches!(
                self,
                FeedError::Network(_) | FeedError::Timeout | FeedError::Cache(_)
            )
    }
}

/// Retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Calculate delay for a given attempt (exponential backoff)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        let delay_ms = self
            .base_delay
            .as_millis()
            .saturating_mul(2_u128.saturating_pow(attempt - 1));
        let delay = Duration::from_millis(delay_ms.min(self.max_delay.as_millis()) as u64);

        debug!("Retry attempt {}: delay = {:?}", attempt, delay);
        delay
    }

    /// Execute operation with retry logic
    pub async fn execute<F, T, E, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
        E: Into<FeedError>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts.max(1) {
            if attempt > 0 {
                sleep(self.delay_for_attempt(attempt)).await;
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    let feed_error: FeedError = e.into();

                    if !feed_error.should_retry() {
                        warn!(
                            "Non-retryable error on attempt {}: {}",
                            attempt + 1,
                            feed_error
                        );
                        return Err(feed_error);
                    }

                    warn!(
                        "Attempt {} failed: {} (retrying...)",
                        attempt + 1,
                        feed_error
                    );
                    last_error = Some(feed_error);
                }
            }
        }

        error!("All {} retry attempts failed", self.max_attempts);
        Err(last_error
            .unwrap_or_else(|| FeedError::NonRecoverable("Max retries exceeded".to_string())))
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_stream_errors_display_verbatim() {
        assert_eq!(FeedError::Remote("timeout".into()).to_string(), "timeout");
        assert_eq!(FeedError::Local("disk full".into()).to_string(), "disk full");
        assert_eq!(FeedError::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_retry_classification() {
        assert!(FeedError::Timeout.should_retry());
        assert!(FeedError::Network("reset".into()).should_retry());
        assert!(!FeedError::Parse("bad".into()).should_retry());
        assert!(!FeedError::Config("bad".into()).is_recoverable());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_retry_stops_on_parse_error() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(1));
        let result: Result<()> = policy
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(FeedError::Parse("bad json".into())) }
            })
            .await;
        assert_eq!(result, Err(FeedError::Parse("bad json".into())));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_after_timeouts() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
        let result = policy
            .execute(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(FeedError::Timeout)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(2));
    }
}
