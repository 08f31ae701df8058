use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a leveraged futures position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }
}

impl FromStr for PositionSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LONG" => Ok(PositionSide::Long),
            "SHORT" => Ok(PositionSide::Short),
            other => Err(format!("invalid position side: {other}")),
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tick-to-tick price direction, bucketed at 0% and ±1%.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Flat,
    Up,
    StrongUp,
    Down,
    StrongDown,
}

impl Trend {
    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Flat => "→",
            Trend::Up => "↑",
            Trend::StrongUp => "↑↑",
            Trend::Down => "↓",
            Trend::StrongDown => "↓↓",
        }
    }

    /// Human-readable trend line for notification subtitles.
    pub fn describe(&self, change_percent: f64) -> String {
        match self {
            Trend::Flat => "flat".to_string(),
            Trend::Up => format!("rising (+{change_percent:.2}%)"),
            Trend::StrongUp => format!("surging (+{change_percent:.2}%)"),
            Trend::Down => format!("falling ({change_percent:.2}%)"),
            Trend::StrongDown => format!("plunging ({change_percent:.2}%)"),
        }
    }
}

/// One row of a batch ticker response: last price plus 24h statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub pair: String,
    pub last_price: f64,
    pub change_24h: f64,
}

/// Open/close of a single candle; providers return the oldest candle first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub close: f64,
}

/// Mutable per-pair spot state, created once at startup and updated in place
/// on every successful tick. A price of zero means "not yet observed".
#[derive(Debug, Clone, Default)]
pub struct SpotEntry {
    pub price: f64,
    pub last_price: f64,
    pub change_24h: f64,
    pub change_5m: f64,
    pub change_1m: f64,
    pub profit: f64,
    pub profit_percent: f64,
    /// Price at which the most recent alert fired; zero means no alert has
    /// fired in the current excursion. Drives the hysteresis check.
    pub last_alert_price: f64,
}

/// Mutable per-pair futures state.
#[derive(Debug, Clone, Default)]
pub struct FuturesEntry {
    pub price: f64,
    pub last_price: f64,
    pub change_24h: f64,
    pub profit: f64,
    pub profit_percent: f64,
    pub liquidation_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    BreachedHigh,
    BreachedLow,
}

impl AlertKind {
    pub fn headline(&self) -> &'static str {
        match self {
            AlertKind::BreachedHigh => "price broke above target",
            AlertKind::BreachedLow => "price broke below target",
        }
    }
}

/// A threshold-crossing notification produced by the alert engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub kind: AlertKind,
    pub pair: String,
    pub title: String,
    pub subtitle: String,
    pub message: String,
    pub price: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}
