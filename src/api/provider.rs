use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::model::{Candle, Ticker};

/// Candle intervals the monitor polls for short-horizon change figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleInterval {
    OneMinute,
    FiveMinutes,
}

impl CandleInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::OneMinute => "1m",
            CandleInterval::FiveMinutes => "5m",
        }
    }
}

/// Read-only market-data source. Batch calls return maps keyed by pair; a
/// pair missing from a batch is not an error, the caller simply skips it for
/// that tick.
#[async_trait]
pub trait MarketDataProvider {
    /// Last price and 24h change for every spot pair the exchange lists.
    async fn spot_tickers(&self) -> Result<HashMap<String, Ticker>>;

    /// Most recent `limit` candles for a pair, oldest first.
    async fn spot_candles(
        &self,
        pair: &str,
        interval: CandleInterval,
        limit: u32,
    ) -> Result<Vec<Candle>>;

    /// Last futures mark price per pair.
    async fn futures_prices(&self) -> Result<HashMap<String, f64>>;

    /// 24h futures statistics per pair.
    async fn futures_stats(&self) -> Result<HashMap<String, Ticker>>;
}

/// Binance quotes numbers as JSON strings; unparseable input degrades to zero
/// rather than failing the whole batch.
pub fn parse_price(value: &serde_json::Value) -> f64 {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_price_handles_strings_numbers_and_junk() {
        assert_eq!(parse_price(&json!("42.5")), 42.5);
        assert_eq!(parse_price(&json!(42.5)), 42.5);
        assert_eq!(parse_price(&json!("not a number")), 0.0);
        assert_eq!(parse_price(&json!(null)), 0.0);
    }
}
