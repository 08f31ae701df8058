use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::api::provider::{CandleInterval, MarketDataProvider};
use crate::config::Config;
use crate::model::{Candle, Ticker};

/// Offline provider that random-walks a set of seeded prices so the
/// dashboard can be exercised without network access.
pub struct DemoProvider {
    spot: Mutex<HashMap<String, DemoSeries>>,
    futures: Mutex<HashMap<String, DemoSeries>>,
}

struct DemoSeries {
    price: f64,
    open_24h: f64,
}

impl DemoSeries {
    fn new(price: f64) -> Self {
        Self {
            price,
            open_24h: price,
        }
    }

    fn step(&mut self) -> Ticker {
        let mut rng = rand::thread_rng();
        // Per-tick drift of up to ±0.5%.
        self.price *= 1.0 + rng.gen_range(-0.005..0.005);
        Ticker {
            pair: String::new(),
            last_price: self.price,
            change_24h: (self.price - self.open_24h) / self.open_24h * 100.0,
        }
    }
}

impl DemoProvider {
    pub fn new(config: &Config) -> Self {
        let seed_price = |symbol: &str| match symbol {
            "BTC" => 60_000.0,
            "ETH" => 2_500.0,
            "BNB" => 550.0,
            "SOL" => 150.0,
            "DOGE" => 0.12,
            _ => 10.0,
        };

        let spot = config
            .spot
            .iter()
            .map(|s| (s.pair.clone(), DemoSeries::new(seed_price(&s.symbol))))
            .collect();
        let futures = config
            .futures
            .iter()
            .map(|f| (f.pair.clone(), DemoSeries::new(seed_price(&f.symbol))))
            .collect();

        Self {
            spot: Mutex::new(spot),
            futures: Mutex::new(futures),
        }
    }

    fn tick(map: &Mutex<HashMap<String, DemoSeries>>) -> HashMap<String, Ticker> {
        let mut guard = map.lock().expect("demo price lock poisoned");
        guard
            .iter_mut()
            .map(|(pair, series)| {
                let mut ticker = series.step();
                ticker.pair = pair.clone();
                (pair.clone(), ticker)
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataProvider for DemoProvider {
    async fn spot_tickers(&self) -> Result<HashMap<String, Ticker>> {
        Ok(Self::tick(&self.spot))
    }

    async fn spot_candles(
        &self,
        pair: &str,
        interval: CandleInterval,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let guard = self.spot.lock().expect("demo price lock poisoned");
        let Some(series) = guard.get(pair) else {
            return Ok(Vec::new());
        };

        // Synthesize a mild move over the candle window.
        let drift = match interval {
            CandleInterval::OneMinute => 0.001,
            CandleInterval::FiveMinutes => 0.003,
        };
        let open = series.price * (1.0 - drift);
        let candles = (0..limit)
            .map(|_| Candle {
                open,
                close: series.price,
            })
            .collect();

        Ok(candles)
    }

    async fn futures_prices(&self) -> Result<HashMap<String, f64>> {
        Ok(Self::tick(&self.futures)
            .into_iter()
            .map(|(pair, ticker)| (pair, ticker.last_price))
            .collect())
    }

    async fn futures_stats(&self) -> Result<HashMap<String, Ticker>> {
        let guard = self.futures.lock().expect("demo price lock poisoned");
        Ok(guard
            .iter()
            .map(|(pair, series)| {
                (
                    pair.clone(),
                    Ticker {
                        pair: pair.clone(),
                        last_price: series.price,
                        change_24h: (series.price - series.open_24h) / series.open_24h * 100.0,
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_provider_serves_configured_pairs() {
        let mut config = Config::default();
        for spot in &mut config.spot {
            spot.pair = format!("{}USDT", spot.symbol);
        }

        let provider = DemoProvider::new(&config);
        let tickers = provider.spot_tickers().await.unwrap();
        assert!(tickers.contains_key("BTCUSDT"));
        assert!(tickers["BTCUSDT"].last_price > 0.0);

        let candles = provider
            .spot_candles("BTCUSDT", CandleInterval::OneMinute, 2)
            .await
            .unwrap();
        assert_eq!(candles.len(), 2);
    }
}
