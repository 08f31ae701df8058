use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use thiserror::Error;

use crate::model::PositionSide;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate {market} pair: {pair}")]
    DuplicatePair { market: &'static str, pair: String },
    #[error("{pair}: leverage must be at least 1")]
    LeverageTooLow { pair: String },
    #[error("{pair}: {field} must not be negative")]
    NegativeValue { pair: String, field: &'static str },
    #[error("spot_interval_ms must be at least 200ms")]
    IntervalTooShort,
    #[error("futures_every_ticks must be at least 1")]
    CadenceTooShort,
    #[error("ui refresh_rate_ms must be at least 50ms")]
    RefreshTooShort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub binance: BinanceSettings,
    pub schedule: ScheduleSettings,
    pub ui: UiSettings,
    pub notifications_enabled: bool,
    #[serde(default)]
    pub spot: Vec<SpotInstrument>,
    #[serde(default)]
    pub futures: Vec<FuturesInstrument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceSettings {
    pub rest_url: String,
    pub futures_rest_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Target period of the spot refresh loop.
    pub spot_interval_ms: u64,
    /// Futures refresh every N spot ticks, so futures cadence is always an
    /// integer multiple of the spot cadence.
    pub futures_every_ticks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiSettings {
    pub refresh_rate_ms: u64,
    pub show_logs: bool,
}

/// A tracked spot holding. Zero cost price or amount means "watch only".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotInstrument {
    pub symbol: String,
    pub display_name: String,
    #[serde(default)]
    pub pair: String,
    #[serde(default)]
    pub cost_price: f64,
    #[serde(default)]
    pub cost_amount: f64,
    #[serde(default)]
    pub alert_high: f64,
    #[serde(default)]
    pub alert_low: f64,
}

/// A tracked futures position. Zero cost price or amount means "watch only".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuturesInstrument {
    pub symbol: String,
    pub display_name: String,
    #[serde(default)]
    pub pair: String,
    #[serde(default)]
    pub cost_price: f64,
    #[serde(default)]
    pub cost_amount: f64,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default = "default_side")]
    pub side: PositionSide,
}

fn default_leverage() -> u32 {
    1
}

fn default_side() -> PositionSide {
    PositionSide::Long
}

const QUOTE_CURRENCY: &str = "USDT";

fn derive_pair(symbol: &str, explicit: &str) -> String {
    if explicit.is_empty() {
        format!("{}{}", symbol.to_ascii_uppercase(), QUOTE_CURRENCY)
    } else {
        explicit.to_string()
    }
}

impl SpotInstrument {
    pub fn watch(symbol: &str, display_name: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            display_name: display_name.to_string(),
            pair: String::new(),
            cost_price: 0.0,
            cost_amount: 0.0,
            alert_high: 0.0,
            alert_low: 0.0,
        }
    }

    pub fn has_position(&self) -> bool {
        self.cost_price > 0.0 && self.cost_amount > 0.0
    }
}

impl FuturesInstrument {
    pub fn has_position(&self) -> bool {
        self.cost_price > 0.0 && self.cost_amount > 0.0
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binance: BinanceSettings::default(),
            schedule: ScheduleSettings::default(),
            ui: UiSettings::default(),
            notifications_enabled: true,
            spot: vec![
                SpotInstrument::watch("BTC", "Bitcoin"),
                SpotInstrument::watch("ETH", "Ethereum"),
                SpotInstrument::watch("BNB", "BNB"),
                SpotInstrument::watch("SOL", "Solana"),
                SpotInstrument::watch("DOGE", "Dogecoin"),
            ],
            futures: Vec::new(),
        }
    }
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            rest_url: "https://api.binance.com".to_string(),
            futures_rest_url: "https://fapi.binance.com".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            spot_interval_ms: 1000,
            futures_every_ticks: 2,
        }
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            refresh_rate_ms: 200,
            show_logs: false,
        }
    }
}

/// Load, normalize, and validate configuration. TOML file first, then
/// environment overrides prefixed with `COINWATCH_`. Validation failures are
/// fatal: the process must not enter the monitor loop on a bad config.
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config_file = config_path.unwrap_or("config.toml");

    let mut config: Config = Figment::from(figment::providers::Serialized::defaults(
        Config::default(),
    ))
    .merge(Toml::file(config_file))
    .merge(Env::prefixed("COINWATCH_").split("__"))
    .extract()
    .with_context(|| format!("failed to load configuration from {config_file}"))?;

    normalize(&mut config);
    validate(&config)?;

    Ok(config)
}

fn normalize(config: &mut Config) {
    for spot in &mut config.spot {
        spot.pair = derive_pair(&spot.symbol, &spot.pair);
    }
    for futures in &mut config.futures {
        futures.pair = derive_pair(&futures.symbol, &futures.pair);
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.schedule.spot_interval_ms < 200 {
        return Err(ConfigError::IntervalTooShort);
    }
    if config.schedule.futures_every_ticks < 1 {
        return Err(ConfigError::CadenceTooShort);
    }
    if config.ui.refresh_rate_ms < 50 {
        return Err(ConfigError::RefreshTooShort);
    }

    let mut seen = HashSet::new();
    for spot in &config.spot {
        if !seen.insert(spot.pair.clone()) {
            return Err(ConfigError::DuplicatePair {
                market: "spot",
                pair: spot.pair.clone(),
            });
        }
        check_non_negative(&spot.pair, "cost_price", spot.cost_price)?;
        check_non_negative(&spot.pair, "cost_amount", spot.cost_amount)?;
        check_non_negative(&spot.pair, "alert_high", spot.alert_high)?;
        check_non_negative(&spot.pair, "alert_low", spot.alert_low)?;
    }

    // Spot and futures namespaces are independent: BTCUSDT may appear once
    // in each.
    let mut seen = HashSet::new();
    for futures in &config.futures {
        if !seen.insert(futures.pair.clone()) {
            return Err(ConfigError::DuplicatePair {
                market: "futures",
                pair: futures.pair.clone(),
            });
        }
        if futures.leverage < 1 {
            return Err(ConfigError::LeverageTooLow {
                pair: futures.pair.clone(),
            });
        }
        check_non_negative(&futures.pair, "cost_price", futures.cost_price)?;
        check_non_negative(&futures.pair, "cost_amount", futures.cost_amount)?;
    }

    Ok(())
}

fn check_non_negative(pair: &str, field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value < 0.0 {
        return Err(ConfigError::NegativeValue {
            pair: pair.to_string(),
            field,
        });
    }
    Ok(())
}

pub fn generate_sample_config(path: &str) -> Result<()> {
    let mut config = Config::default();
    config.spot[0].cost_price = 60_000.0;
    config.spot[0].cost_amount = 1_000.0;
    config.spot[0].alert_high = 75_000.0;
    config.spot[0].alert_low = 50_000.0;
    config.futures.push(FuturesInstrument {
        symbol: "ETH".to_string(),
        display_name: "Ethereum perp".to_string(),
        pair: String::new(),
        cost_price: 2_500.0,
        cost_amount: 500.0,
        leverage: 5,
        side: PositionSide::Long,
    });

    let toml_content = toml::to_string_pretty(&config)?;
    fs::write(path, toml_content)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_derived_from_symbol_when_unset() {
        let mut config = Config::default();
        config.spot.push(SpotInstrument::watch("sui", "Sui"));
        normalize(&mut config);
        assert_eq!(config.spot.last().unwrap().pair, "SUIUSDT");
        assert_eq!(config.spot[0].pair, "BTCUSDT");
    }

    #[test]
    fn explicit_pair_wins() {
        assert_eq!(derive_pair("BTC", "BTCFDUSD"), "BTCFDUSD");
    }

    #[test]
    fn duplicate_spot_pair_rejected() {
        let mut config = Config::default();
        config.spot.push(SpotInstrument::watch("BTC", "Bitcoin again"));
        normalize(&mut config);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::DuplicatePair { market: "spot", .. })
        ));
    }

    #[test]
    fn same_pair_allowed_across_markets() {
        let mut config = Config::default();
        config.futures.push(FuturesInstrument {
            symbol: "BTC".to_string(),
            display_name: "Bitcoin perp".to_string(),
            pair: String::new(),
            cost_price: 0.0,
            cost_amount: 0.0,
            leverage: 1,
            side: PositionSide::Long,
        });
        normalize(&mut config);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn zero_leverage_rejected() {
        let mut config = Config::default();
        config.futures.push(FuturesInstrument {
            symbol: "ETH".to_string(),
            display_name: "Ethereum perp".to_string(),
            pair: String::new(),
            cost_price: 2500.0,
            cost_amount: 500.0,
            leverage: 0,
            side: PositionSide::Short,
        });
        normalize(&mut config);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::LeverageTooLow { .. })
        ));
    }

    #[test]
    fn negative_cost_rejected() {
        let mut config = Config::default();
        config.spot[0].cost_price = -1.0;
        normalize(&mut config);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::NegativeValue { .. })
        ));
    }

    #[test]
    fn loads_toml_with_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                notifications_enabled = true

                [[spot]]
                symbol = "BTC"
                display_name = "Bitcoin"
                cost_price = 60000.0
                cost_amount = 1000.0
                "#,
            )?;
            jail.set_env("COINWATCH_NOTIFICATIONS_ENABLED", "false");

            let config = load_config(None).expect("config should load");
            assert!(!config.notifications_enabled);
            assert_eq!(config.spot.len(), 1);
            assert_eq!(config.spot[0].pair, "BTCUSDT");
            assert!(config.spot[0].has_position());
            Ok(())
        });
    }
}
