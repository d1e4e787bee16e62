//! Data module root
// Ticker records, their mapping, and the remote/local sources behind them.

pub mod cache;
pub mod local;
pub mod mapper;
pub mod remote;
pub mod source;
pub mod types;

pub use cache::RedisLocalSource;
pub use local::MemoryLocalSource;
pub use mapper::CoinMapper;
pub use remote::HttpRemoteSource;
pub use source::{LocalSource, RemoteSource};
pub use types::{total_market_cap, CoinRecord, CoinView};
