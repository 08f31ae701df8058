use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::alert::{self, AlertThresholds};
use crate::api::provider::{CandleInterval, MarketDataProvider};
use crate::config::{Config, FuturesInstrument, ScheduleSettings, SpotInstrument};
use crate::metrics;
use crate::model::{AlertEvent, Candle, FuturesEntry, SpotEntry, Ticker};
use crate::notify::Notifier;

const MAX_RETAINED_ALERTS: usize = 1000;

/// Aggregate P&L over one market, recomputed from the entries on every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub investment: f64,
    pub profit: f64,
    pub profit_percent: f64,
}

/// All mutable monitor state. One entry per configured pair, created at
/// startup and updated in place for the life of the process. Writers apply a
/// whole iteration before releasing the lock, so readers never observe a
/// half-updated view.
pub struct MarketState {
    pub spot_configs: Vec<SpotInstrument>,
    pub futures_configs: Vec<FuturesInstrument>,
    pub spot: HashMap<String, SpotEntry>,
    pub futures: HashMap<String, FuturesEntry>,
    pub spot_totals: Totals,
    pub futures_totals: Totals,
    pub last_spot_update: Option<DateTime<Utc>>,
    pub last_futures_update: Option<DateTime<Utc>>,
}

impl MarketState {
    pub fn new(config: &Config) -> Self {
        let spot = config
            .spot
            .iter()
            .map(|s| (s.pair.clone(), SpotEntry::default()))
            .collect();
        let futures = config
            .futures
            .iter()
            .map(|f| (f.pair.clone(), FuturesEntry::default()))
            .collect();

        Self {
            spot_configs: config.spot.clone(),
            futures_configs: config.futures.clone(),
            spot,
            futures,
            spot_totals: Totals::default(),
            futures_totals: Totals::default(),
            last_spot_update: None,
            last_futures_update: None,
        }
    }

    /// Apply one batch of spot tickers. Pairs missing from the batch keep
    /// their previous values. Returns the alert events this tick produced.
    pub fn apply_spot_tick(&mut self, tickers: &HashMap<String, Ticker>) -> Vec<AlertEvent> {
        let mut events = Vec::new();

        for cfg in &self.spot_configs {
            let Some(ticker) = tickers.get(&cfg.pair) else {
                debug!("{} missing from spot batch, keeping stale values", cfg.pair);
                continue;
            };
            let entry = self
                .spot
                .entry(cfg.pair.clone())
                .or_insert_with(SpotEntry::default);

            let current = ticker.last_price;
            let thresholds = AlertThresholds {
                high: cfg.alert_high,
                low: cfg.alert_low,
            };
            if let Some(event) =
                alert::check_price_alert(&cfg.pair, &cfg.display_name, thresholds, entry, current)
            {
                events.push(event);
            }

            let pnl = metrics::spot_profit(cfg.cost_price, cfg.cost_amount, current);
            entry.price = current;
            entry.change_24h = ticker.change_24h;
            entry.profit = pnl.profit;
            entry.profit_percent = pnl.percent;
        }

        self.spot_totals = spot_totals(&self.spot_configs, &self.spot);
        self.last_spot_update = Some(Utc::now());
        events
    }

    /// Record a short-horizon change figure from a candle window: the move
    /// from the oldest candle's open to the newest candle's close.
    pub fn apply_spot_candles(&mut self, pair: &str, interval: CandleInterval, candles: &[Candle]) {
        let (Some(first), Some(last)) = (candles.first(), candles.last()) else {
            return;
        };
        let change = metrics::percent_change(last.close, first.open);

        if let Some(entry) = self.spot.get_mut(pair) {
            match interval {
                CandleInterval::OneMinute => entry.change_1m = change,
                CandleInterval::FiveMinutes => entry.change_5m = change,
            }
        }
    }

    /// Apply one futures refresh. A pair must appear in both the price and
    /// the 24h-stats batch to be updated this tick.
    pub fn apply_futures_tick(
        &mut self,
        prices: &HashMap<String, f64>,
        stats: &HashMap<String, Ticker>,
    ) {
        for cfg in &self.futures_configs {
            let (Some(&price), Some(stat)) = (prices.get(&cfg.pair), stats.get(&cfg.pair)) else {
                debug!("{} missing from futures batch, keeping stale values", cfg.pair);
                continue;
            };
            let entry = self
                .futures
                .entry(cfg.pair.clone())
                .or_insert_with(FuturesEntry::default);

            let pnl = metrics::futures_profit(
                cfg.cost_price,
                cfg.cost_amount,
                cfg.leverage,
                cfg.side,
                price,
            );
            entry.last_price = entry.price;
            entry.price = price;
            entry.change_24h = stat.change_24h;
            entry.profit = pnl.profit;
            entry.profit_percent = pnl.percent;
            entry.liquidation_price = pnl.liquidation_price;
        }

        self.futures_totals = futures_totals(&self.futures_configs, &self.futures);
        self.last_futures_update = Some(Utc::now());
    }

    /// Spot rows ordered for display: descending by current price, ties kept
    /// in configuration order.
    pub fn ranked_spot(&self) -> Vec<(&SpotInstrument, &SpotEntry)> {
        let mut rows: Vec<_> = self
            .spot_configs
            .iter()
            .filter_map(|cfg| self.spot.get(&cfg.pair).map(|entry| (cfg, entry)))
            .collect();
        rows.sort_by(|a, b| b.1.price.total_cmp(&a.1.price));
        rows
    }

    pub fn ranked_futures(&self) -> Vec<(&FuturesInstrument, &FuturesEntry)> {
        let mut rows: Vec<_> = self
            .futures_configs
            .iter()
            .filter_map(|cfg| self.futures.get(&cfg.pair).map(|entry| (cfg, entry)))
            .collect();
        rows.sort_by(|a, b| b.1.price.total_cmp(&a.1.price));
        rows
    }
}

fn totals_from(investment: f64, profit: f64) -> Totals {
    Totals {
        investment,
        profit,
        profit_percent: if investment > 0.0 {
            profit / investment * 100.0
        } else {
            0.0
        },
    }
}

fn spot_totals(configs: &[SpotInstrument], entries: &HashMap<String, SpotEntry>) -> Totals {
    let investment = configs
        .iter()
        .filter(|c| c.has_position())
        .map(|c| c.cost_amount)
        .sum();
    let profit = entries.values().map(|e| e.profit).sum();
    totals_from(investment, profit)
}

fn futures_totals(configs: &[FuturesInstrument], entries: &HashMap<String, FuturesEntry>) -> Totals {
    let investment = configs
        .iter()
        .filter(|c| c.has_position())
        .map(|c| c.cost_amount)
        .sum();
    let profit = entries.values().map(|e| e.profit).sum();
    totals_from(investment, profit)
}

/// Counter implementing the futures cadence: fires on every Nth spot tick.
struct Cadence {
    every: u32,
    counter: u32,
}

impl Cadence {
    fn new(every: u32) -> Self {
        Self { every, counter: 0 }
    }

    fn tick(&mut self) -> bool {
        self.counter += 1;
        if self.counter >= self.every {
            self.counter = 0;
            true
        } else {
            false
        }
    }
}

/// The monitor loop: refresh spot every tick, futures every Nth tick, then
/// sleep whatever remains of the target period. A slow iteration starts the
/// next one immediately; there is no catch-up skipping.
pub async fn run<P: MarketDataProvider>(
    provider: Arc<P>,
    state: Arc<RwLock<MarketState>>,
    alerts: Arc<RwLock<Vec<AlertEvent>>>,
    notifier: Arc<dyn Notifier>,
    schedule: ScheduleSettings,
) {
    let period = Duration::from_millis(schedule.spot_interval_ms);
    let mut futures_cadence = Cadence::new(schedule.futures_every_ticks);

    info!(
        "monitor loop started: spot every {}ms, futures every {} ticks",
        schedule.spot_interval_ms, schedule.futures_every_ticks
    );

    loop {
        let start = Instant::now();

        refresh_spot(&*provider, &state, &alerts, &notifier).await;
        if futures_cadence.tick() {
            refresh_futures(&*provider, &state).await;
        }

        if let Some(remaining) = period.checked_sub(start.elapsed()) {
            tokio::time::sleep(remaining).await;
        }
    }
}

/// One spot refresh. Any provider error is logged and the previous snapshot
/// values stand; the next tick is the retry.
async fn refresh_spot<P: MarketDataProvider>(
    provider: &P,
    state: &RwLock<MarketState>,
    alerts: &RwLock<Vec<AlertEvent>>,
    notifier: &Arc<dyn Notifier>,
) {
    let tickers = match provider.spot_tickers().await {
        Ok(tickers) => tickers,
        Err(e) => {
            error!("spot ticker fetch failed: {e:#}");
            return;
        }
    };

    // Gather candle windows before taking the write lock so the whole
    // iteration lands atomically. Per-pair candle failures only cost that
    // pair its short-horizon figures this tick.
    let pairs: Vec<String> = {
        let guard = state.read().await;
        guard.spot_configs.iter().map(|c| c.pair.clone()).collect()
    };

    let mut candle_updates = Vec::new();
    for pair in &pairs {
        if !tickers.contains_key(pair) {
            continue;
        }
        for interval in [CandleInterval::OneMinute, CandleInterval::FiveMinutes] {
            match provider.spot_candles(pair, interval, 2).await {
                Ok(candles) => candle_updates.push((pair.clone(), interval, candles)),
                Err(e) => debug!("{pair} {} candle fetch failed: {e:#}", interval.as_str()),
            }
        }
    }

    let events = {
        let mut guard = state.write().await;
        let events = guard.apply_spot_tick(&tickers);
        for (pair, interval, candles) in &candle_updates {
            guard.apply_spot_candles(pair, *interval, candles);
        }
        events
    };

    if !events.is_empty() {
        info!("{} price alert(s) fired", events.len());
        for event in &events {
            notifier.notify(event);
        }
        let mut guard = alerts.write().await;
        guard.extend(events);
        if guard.len() > MAX_RETAINED_ALERTS {
            let excess = guard.len() - MAX_RETAINED_ALERTS / 2;
            guard.drain(0..excess);
        }
    }
}

async fn refresh_futures<P: MarketDataProvider>(provider: &P, state: &RwLock<MarketState>) {
    let prices = match provider.futures_prices().await {
        Ok(prices) => prices,
        Err(e) => {
            error!("futures price fetch failed: {e:#}");
            return;
        }
    };
    let stats = match provider.futures_stats().await {
        Ok(stats) => stats,
        Err(e) => {
            error!("futures stats fetch failed: {e:#}");
            return;
        }
    };

    let mut guard = state.write().await;
    guard.apply_futures_tick(&prices, &stats);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PositionSide;

    fn ticker(pair: &str, price: f64) -> (String, Ticker) {
        (
            pair.to_string(),
            Ticker {
                pair: pair.to_string(),
                last_price: price,
                change_24h: 0.0,
            },
        )
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.spot = vec![
            SpotInstrument::watch("AAA", "Asset A"),
            SpotInstrument::watch("BBB", "Asset B"),
            SpotInstrument::watch("CCC", "Asset C"),
        ];
        for spot in &mut config.spot {
            spot.pair = format!("{}USDT", spot.symbol);
        }
        config
    }

    #[test]
    fn ranking_is_descending_by_price() {
        let mut state = MarketState::new(&test_config());
        let tickers = [
            ticker("AAAUSDT", 100.0),
            ticker("BBBUSDT", 50.0),
            ticker("CCCUSDT", 200.0),
        ]
        .into_iter()
        .collect();
        state.apply_spot_tick(&tickers);

        let order: Vec<&str> = state
            .ranked_spot()
            .iter()
            .map(|(cfg, _)| cfg.symbol.as_str())
            .collect();
        assert_eq!(order, vec!["CCC", "AAA", "BBB"]);
    }

    #[test]
    fn ranking_ties_keep_configuration_order() {
        let mut state = MarketState::new(&test_config());
        let tickers = [
            ticker("AAAUSDT", 100.0),
            ticker("BBBUSDT", 100.0),
            ticker("CCCUSDT", 100.0),
        ]
        .into_iter()
        .collect();
        state.apply_spot_tick(&tickers);

        let order: Vec<&str> = state
            .ranked_spot()
            .iter()
            .map(|(cfg, _)| cfg.symbol.as_str())
            .collect();
        assert_eq!(order, vec!["AAA", "BBB", "CCC"]);
    }

    #[test]
    fn missing_symbol_keeps_stale_entry() {
        let mut state = MarketState::new(&test_config());
        let full: HashMap<_, _> = [
            ticker("AAAUSDT", 100.0),
            ticker("BBBUSDT", 50.0),
            ticker("CCCUSDT", 200.0),
        ]
        .into_iter()
        .collect();
        state.apply_spot_tick(&full);

        let partial: HashMap<_, _> = [ticker("AAAUSDT", 110.0)].into_iter().collect();
        state.apply_spot_tick(&partial);

        assert_eq!(state.spot["AAAUSDT"].price, 110.0);
        assert_eq!(state.spot["BBBUSDT"].price, 50.0);
        assert_eq!(state.spot["CCCUSDT"].price, 200.0);
    }

    #[test]
    fn spot_totals_cover_open_positions_only() {
        let mut config = test_config();
        config.spot[0].cost_price = 100.0;
        config.spot[0].cost_amount = 1000.0;
        // Cost amount without a cost price is not an open position.
        config.spot[1].cost_amount = 500.0;

        let mut state = MarketState::new(&config);
        let tickers = [
            ticker("AAAUSDT", 150.0),
            ticker("BBBUSDT", 50.0),
            ticker("CCCUSDT", 200.0),
        ]
        .into_iter()
        .collect();
        state.apply_spot_tick(&tickers);

        assert_eq!(state.spot_totals.investment, 1000.0);
        assert!((state.spot_totals.profit - 500.0).abs() < 1e-9);
        assert!((state.spot_totals.profit_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn futures_tick_requires_both_batches() {
        let mut config = Config::default();
        config.spot.clear();
        config.futures = vec![FuturesInstrument {
            symbol: "BTC".to_string(),
            display_name: "Bitcoin perp".to_string(),
            pair: "BTCUSDT".to_string(),
            cost_price: 100.0,
            cost_amount: 1000.0,
            leverage: 10,
            side: PositionSide::Long,
        }];

        let mut state = MarketState::new(&config);
        let prices: HashMap<_, _> = [("BTCUSDT".to_string(), 90.0)].into_iter().collect();

        state.apply_futures_tick(&prices, &HashMap::new());
        assert_eq!(state.futures["BTCUSDT"].price, 0.0);

        let stats: HashMap<_, _> = [ticker("BTCUSDT", 90.0)].into_iter().collect();
        state.apply_futures_tick(&prices, &stats);

        let entry = &state.futures["BTCUSDT"];
        assert_eq!(entry.price, 90.0);
        assert!((entry.profit_percent + 100.0).abs() < 1e-9);
        assert!((entry.profit + 1000.0).abs() < 1e-9);
        assert!((entry.liquidation_price - 91.0).abs() < 1e-9);
        assert!((state.futures_totals.profit + 1000.0).abs() < 1e-9);
    }

    #[test]
    fn candle_window_sets_short_horizon_change() {
        let mut state = MarketState::new(&test_config());
        let candles = [
            Candle {
                open: 100.0,
                close: 101.0,
            },
            Candle {
                open: 101.0,
                close: 102.0,
            },
        ];
        state.apply_spot_candles("AAAUSDT", CandleInterval::OneMinute, &candles);
        assert!((state.spot["AAAUSDT"].change_1m - 2.0).abs() < 1e-9);

        // Empty windows leave the previous figure alone.
        state.apply_spot_candles("AAAUSDT", CandleInterval::OneMinute, &[]);
        assert!((state.spot["AAAUSDT"].change_1m - 2.0).abs() < 1e-9);
    }

    #[test]
    fn alert_fires_through_tick_application() {
        let mut config = test_config();
        config.spot[0].alert_high = 120.0;

        let mut state = MarketState::new(&config);
        let below: HashMap<_, _> = [ticker("AAAUSDT", 100.0)].into_iter().collect();
        let above: HashMap<_, _> = [ticker("AAAUSDT", 125.0)].into_iter().collect();

        assert!(state.apply_spot_tick(&below).is_empty());
        let events = state.apply_spot_tick(&above);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pair, "AAAUSDT");
        // Same excursion: no second event while the price stays above.
        assert!(state.apply_spot_tick(&above).is_empty());
    }

    #[test]
    fn futures_cadence_fires_every_nth_tick() {
        let mut cadence = Cadence::new(2);
        let fired: Vec<bool> = (0..6).map(|_| cadence.tick()).collect();
        assert_eq!(fired, vec![false, true, false, true, false, true]);

        let mut every_tick = Cadence::new(1);
        assert!(every_tick.tick());
        assert!(every_tick.tick());
    }
}
