//! Conversions between the ticker wire format, cached records and views.

use super::types::{CoinRecord, CoinView};
use crate::config::settings::DEFAULT_ICON_BASE_URL;
use crate::error::{FeedError, Result};
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct CoinMapper {
    icon_base_url: String,
}

impl Default for CoinMapper {
    fn default() -> Self {
        Self::new(DEFAULT_ICON_BASE_URL)
    }
}

impl CoinMapper {
    pub fn new(icon_base_url: &str) -> Self {
        Self {
            icon_base_url: icon_base_url.to_string(),
        }
    }

    /// Maps a batch to its views, preserving order.
    pub fn map_batch(&self, records: &[CoinRecord]) -> Vec<CoinView> {
        records.iter().map(|r| self.map_record(r)).collect()
    }

    pub fn map_record(&self, record: &CoinRecord) -> CoinView {
        CoinView {
            id: record.id.clone(),
            name: record.name.clone(),
            symbol: record.symbol.clone(),
            icon_url: self.icon_url(&record.symbol),
            rank: record.rank,
            price_usd: record.price_usd,
            market_cap: record.market_cap_usd,
            volume_24h: record.volume_24h_usd,
            change_1h: record.percent_change_1h,
            change_24h: record.percent_change_24h,
            change_7d: record.percent_change_7d,
        }
    }

    fn icon_url(&self, symbol: &str) -> String {
        format!("{}{}.png", self.icon_base_url, symbol.to_lowercase())
    }

    /// Parses a ticker response: a JSON array of coin objects whose numeric
    /// fields may be encoded either as strings or as numbers.
    pub fn parse_ticker(&self, payload: &Value) -> Result<Vec<CoinRecord>> {
        let entries = payload
            .as_array()
            .ok_or_else(|| FeedError::Parse("ticker payload is not a JSON array".to_string()))?;

        entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let obj = entry.as_object().ok_or_else(|| {
                    FeedError::Parse(format!("ticker entry {} is not an object", idx))
                })?;
                parse_entry(obj).ok_or_else(|| {
                    FeedError::Parse(format!("ticker entry {} has no id", idx))
                })
            })
            .collect()
    }
}

fn parse_entry(obj: &Map<String, Value>) -> Option<CoinRecord> {
    let id = text_field(obj, "id").filter(|id| !id.is_empty())?;
    Some(CoinRecord {
        name: text_field(obj, "name").unwrap_or_else(|| id.clone()),
        symbol: text_field(obj, "symbol").unwrap_or_default(),
        rank: num_field(obj, "rank").map(|r| r.max(0.0) as u32).unwrap_or(0),
        price_usd: num_field(obj, "price_usd").unwrap_or(0.0),
        price_btc: num_field(obj, "price_btc").unwrap_or(0.0),
        volume_24h_usd: num_field(obj, "24h_volume_usd").unwrap_or(0.0),
        market_cap_usd: num_field(obj, "market_cap_usd").unwrap_or(0.0),
        available_supply: num_field(obj, "available_supply").unwrap_or(0.0),
        total_supply: num_field(obj, "total_supply").unwrap_or(0.0),
        max_supply: num_field(obj, "max_supply"),
        percent_change_1h: num_field(obj, "percent_change_1h").unwrap_or(0.0),
        percent_change_24h: num_field(obj, "percent_change_24h").unwrap_or(0.0),
        percent_change_7d: num_field(obj, "percent_change_7d").unwrap_or(0.0),
        last_updated: num_field(obj, "last_updated")
            .map(|t| t.max(0.0) as u64)
            .unwrap_or(0),
        id,
    })
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn num_field(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
