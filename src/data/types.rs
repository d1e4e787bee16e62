use serde::{Deserialize, Serialize};

/// Ticker entry as delivered by the remote API and stored by the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoinRecord {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub rank: u32,
    pub price_usd: f64,
    pub price_btc: f64,
    pub volume_24h_usd: f64,
    pub market_cap_usd: f64,
    pub available_supply: f64,
    pub total_supply: f64,
    pub max_supply: Option<f64>,
    pub percent_change_1h: f64,
    pub percent_change_24h: f64,
    pub percent_change_7d: f64,
    /// Unix seconds
    pub last_updated: u64,
}

impl CoinRecord {
    /// Minimal record, mostly useful for tests and fixtures.
    pub fn new(id: &str, symbol: &str, market_cap_usd: f64) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            symbol: symbol.to_string(),
            market_cap_usd,
            ..Default::default()
        }
    }
}

/// Presentation form of a `CoinRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinView {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub icon_url: String,
    pub rank: u32,
    pub price_usd: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
    pub change_1h: f64,
    pub change_24h: f64,
    pub change_7d: f64,
}

/// Sum of `market_cap` over a batch; 0 for an empty batch.
pub fn total_market_cap(views: &[CoinView]) -> f64 {
    views.iter().map(|v| v.market_cap).sum()
}
