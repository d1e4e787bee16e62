pub mod settings;

pub use settings::Config;

use crate::error::FeedError;
use std::sync::Arc;

/// Loads `.env` (if present) and the process environment into a validated `Config`.
pub fn load_config() -> Result<Arc<Config>, FeedError> {
    dotenv::dotenv().ok(); // Load .env file if present, ignore errors

    let config = Config::from_env();
    validate(&config)?;
    config.validate_and_log();

    Ok(Arc::new(config))
}

pub fn validate(config: &Config) -> Result<(), FeedError> {
    url::Url::parse(&config.api_url)?;
    if config.api_limit == 0 {
        return Err(FeedError::Config("COIN_API_LIMIT must be > 0".to_string()));
    }
    if config.worker_pool_size == 0 {
        return Err(FeedError::Config("WORKER_POOL_SIZE must be > 0".to_string()));
    }
    if config.stream_channel_capacity == 0 {
        return Err(FeedError::Config(
            "STREAM_CHANNEL_CAPACITY must be > 0".to_string(),
        ));
    }
    if let Some(redis_url) = &config.redis_url {
        url::Url::parse(redis_url)?;
    }
    Ok(())
}
