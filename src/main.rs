// src/main.rs
use clap::Parser;
use coin_feed::{
    config::load_config,
    coordinator::MergeCoordinator,
    data::{
        total_market_cap, CoinMapper, HttpRemoteSource, LocalSource, MemoryLocalSource,
        RedisLocalSource,
    },
    utils::{format_usd, setup_logging},
};
use log::{error, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "coin-feed", about = "Crypto ticker feed with local cache fallback")]
struct Cli {
    /// Refresh period in seconds (overrides REFRESH_INTERVAL_SECS)
    #[arg(long)]
    interval: Option<u64>,

    /// Number of coins to request (overrides COIN_API_LIMIT)
    #[arg(long)]
    limit: Option<usize>,

    /// Fetch once, print the merged result and exit
    #[arg(long)]
    once: bool,

    /// Use the Redis cache (REDIS_URL) instead of the in-memory cache
    #[arg(long)]
    redis: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = (*load_config()?).clone();
    if let Some(limit) = cli.limit {
        config.api_limit = limit.max(1);
    }
    if let Some(interval) = cli.interval {
        config.refresh_interval_secs = interval.max(1);
    }
    setup_logging(config.log_level_filter())?;
    info!("coin-feed starting");

    let remote = Arc::new(HttpRemoteSource::from_config(&config)?);
    let local: Arc<dyn LocalSource> = if cli.redis {
        Arc::new(RedisLocalSource::from_config(&config).await?)
    } else {
        Arc::new(MemoryLocalSource::new(config.stream_channel_capacity))
    };

    let coordinator = Arc::new(MergeCoordinator::new(
        remote,
        local,
        CoinMapper::new(&config.icon_base_url),
        config.coordinator_config(),
    ));

    if cli.once {
        return run_once(&coordinator, config.request_timeout() * config.api_max_retries.max(1) * 2)
            .await;
    }

    let mut errors = coordinator.error_stream();
    tokio::spawn(async move {
        loop {
            match errors.recv().await {
                Ok(message) => warn!("Feed error: {}", message),
                Err(RecvError::Lagged(n)) => warn!("Error log lagged by {} messages", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut data = coordinator.data_stream();
    tokio::spawn(async move {
        loop {
            match data.recv().await {
                Ok(views) => {
                    info!(
                        "Merged update: {} coins, total market cap {}",
                        views.len(),
                        format_usd(total_market_cap(&views))
                    );
                    if let Some(top) = views.first() {
                        info!(
                            "  #{} {} ({}) {} ({:+.2}% 24h)",
                            top.rank,
                            top.name,
                            top.symbol,
                            format_usd(top.price_usd),
                            top.change_24h
                        );
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Data log lagged by {} messages", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(config.refresh_interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => coordinator.fetch_data(),
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    coordinator.shutdown();
    info!("Final metrics: {:?}", coordinator.metrics());
    Ok(())
}

async fn run_once(coordinator: &MergeCoordinator, wait: Duration) -> anyhow::Result<()> {
    let mut data = coordinator.data_stream();
    let mut errors = coordinator.error_stream();
    coordinator.fetch_data();

    let deadline = tokio::time::sleep(wait);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            Ok(message) = errors.recv() => warn!("Feed error: {}", message),
            Ok(views) = data.recv() => {
                println!("{}", serde_json::to_string_pretty(&views)?);
                println!("Total market cap: {}", format_usd(coordinator.total_market_cap()));
                return Ok(());
            }
            _ = &mut deadline => {
                error!("No data received within {:?}", wait);
                anyhow::bail!("no data received");
            }
        }
    }
}
