use crate::coordinator::CoordinatorConfig;
use crate::error::RetryPolicy;
use std::env;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.coinmarketcap.com/v1/ticker/";
pub const DEFAULT_ICON_BASE_URL: &str = "https://res.cloudinary.com/dxi90ksom/image/upload/";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_limit: usize,
    pub api_timeout_ms: u64,
    pub api_max_retries: u32,
    pub api_retry_delay_ms: u64,
    pub icon_base_url: String,
    pub redis_url: Option<String>,
    pub redis_cache_key: String,
    pub redis_default_ttl_secs: u64,
    pub worker_pool_size: usize,
    pub stream_channel_capacity: usize,
    pub refresh_interval_secs: u64,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            api_url: env::var("COIN_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            api_limit: env::var("COIN_API_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            api_timeout_ms: env::var("COIN_API_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10_000),
            api_max_retries: env::var("COIN_API_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            api_retry_delay_ms: env::var("COIN_API_RETRY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            icon_base_url: env::var("COIN_ICON_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_ICON_BASE_URL.to_string()),
            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty()),
            redis_cache_key: env::var("REDIS_CACHE_KEY")
                .unwrap_or_else(|_| "coins:all".to_string()),
            redis_default_ttl_secs: env::var("REDIS_DEFAULT_TTL_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .unwrap_or(86_400),
            worker_pool_size: env::var("WORKER_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            stream_channel_capacity: env::var("STREAM_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(256),
            refresh_interval_secs: env::var("REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Fixed configuration for tests, independent of the process environment.
    pub fn test_default() -> Self {
        Config {
            api_url: "http://127.0.0.1:9/v1/ticker/".to_string(),
            api_limit: 10,
            api_timeout_ms: 200,
            api_max_retries: 1,
            api_retry_delay_ms: 1,
            icon_base_url: DEFAULT_ICON_BASE_URL.to_string(),
            redis_url: None,
            redis_cache_key: "coins:test".to_string(),
            redis_default_ttl_secs: 60,
            worker_pool_size: 5,
            stream_channel_capacity: 64,
            refresh_interval_secs: 1,
            log_level: "debug".to_string(),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            worker_pool_size: self.worker_pool_size,
            channel_capacity: self.stream_channel_capacity,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.api_max_retries.max(1),
            Duration::from_millis(self.api_retry_delay_ms),
            Duration::from_millis(self.api_retry_delay_ms.saturating_mul(8)),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    pub fn validate_and_log(&self) {
        log::info!("Application Configuration Loaded: {:?}", self);
        if self.redis_url.is_none() {
            log::info!("REDIS_URL not set, using in-memory cache");
        }
    }
}
