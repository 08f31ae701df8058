use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::api::provider::{parse_price, CandleInterval, MarketDataProvider};
use crate::config::BinanceSettings;
use crate::model::{Candle, Ticker};

/// Unauthenticated Binance REST client covering the public market-data
/// endpoints the monitor needs.
pub struct BinanceProvider {
    client: Client,
    rest_url: String,
    futures_rest_url: String,
}

impl BinanceProvider {
    pub fn new(settings: &BinanceSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            rest_url: settings.rest_url.trim_end_matches('/').to_string(),
            futures_rest_url: settings.futures_rest_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        debug!("GET {url}");
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("request failed: {status} {body}"));
        }

        Ok(response.json().await?)
    }

    fn ticker_rows(value: Value, price_field: &str) -> Result<HashMap<String, Ticker>> {
        let rows = value
            .as_array()
            .ok_or_else(|| anyhow!("expected a ticker array"))?;

        let mut tickers = HashMap::with_capacity(rows.len());
        for row in rows {
            let Some(pair) = row.get("symbol").and_then(Value::as_str) else {
                continue;
            };
            tickers.insert(
                pair.to_string(),
                Ticker {
                    pair: pair.to_string(),
                    last_price: parse_price(row.get(price_field).unwrap_or(&Value::Null)),
                    change_24h: parse_price(
                        row.get("priceChangePercent").unwrap_or(&Value::Null),
                    ),
                },
            );
        }

        Ok(tickers)
    }
}

#[async_trait]
impl MarketDataProvider for BinanceProvider {
    async fn spot_tickers(&self) -> Result<HashMap<String, Ticker>> {
        let url = format!("{}/api/v3/ticker/24hr", self.rest_url);
        Self::ticker_rows(self.get_json(&url).await?, "lastPrice")
    }

    async fn spot_candles(
        &self,
        pair: &str,
        interval: CandleInterval,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.rest_url,
            pair,
            interval.as_str(),
            limit
        );
        let rows = self.get_json(&url).await?;
        let rows = rows
            .as_array()
            .ok_or_else(|| anyhow!("expected a kline array"))?;

        // Kline rows are positional arrays: open sits at index 1, close at 4.
        let candles = rows
            .iter()
            .filter_map(|row| {
                let row = row.as_array()?;
                Some(Candle {
                    open: parse_price(row.get(1)?),
                    close: parse_price(row.get(4)?),
                })
            })
            .collect();

        Ok(candles)
    }

    async fn futures_prices(&self) -> Result<HashMap<String, f64>> {
        let url = format!("{}/fapi/v1/ticker/price", self.futures_rest_url);
        let rows = self.get_json(&url).await?;
        let rows = rows
            .as_array()
            .ok_or_else(|| anyhow!("expected a price array"))?;

        let mut prices = HashMap::with_capacity(rows.len());
        for row in rows {
            let Some(pair) = row.get("symbol").and_then(Value::as_str) else {
                continue;
            };
            prices.insert(
                pair.to_string(),
                parse_price(row.get("price").unwrap_or(&Value::Null)),
            );
        }

        Ok(prices)
    }

    async fn futures_stats(&self) -> Result<HashMap<String, Ticker>> {
        let url = format!("{}/fapi/v1/ticker/24hr", self.futures_rest_url);
        Self::ticker_rows(self.get_json(&url).await?, "lastPrice")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ticker_rows_parses_batch() {
        let value = json!([
            {"symbol": "BTCUSDT", "lastPrice": "60000.5", "priceChangePercent": "2.1"},
            {"symbol": "ETHUSDT", "lastPrice": "2500.0", "priceChangePercent": "-1.3"},
            {"noSymbol": true}
        ]);
        let tickers = BinanceProvider::ticker_rows(value, "lastPrice").unwrap();
        assert_eq!(tickers.len(), 2);
        assert_eq!(tickers["BTCUSDT"].last_price, 60000.5);
        assert_eq!(tickers["ETHUSDT"].change_24h, -1.3);
    }

    #[test]
    fn ticker_rows_rejects_non_array() {
        assert!(BinanceProvider::ticker_rows(json!({"error": "down"}), "lastPrice").is_err());
    }
}
