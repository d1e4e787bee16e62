pub mod config;
pub mod coordinator;
pub mod data;
pub mod error;
pub mod utils;

pub use coordinator::{CoordinatorConfig, MergeCoordinator, MetricsSnapshot};
pub use data::{CoinMapper, CoinRecord, CoinView, LocalSource, RemoteSource};
pub use error::{FeedError, Result};
