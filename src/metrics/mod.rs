use crate::model::{PositionSide, Trend};

/// Fixed safety factor below the mathematical 100% exhaustion point used for
/// the liquidation estimate. Exchanges liquidate before margin hits zero.
pub const MARGIN_BUFFER: f64 = 0.9;

/// Unrealized spot P&L for one position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpotProfit {
    pub profit: f64,
    pub percent: f64,
}

/// Unrealized futures P&L plus the estimated liquidation price.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FuturesProfit {
    pub profit: f64,
    pub percent: f64,
    pub liquidation_price: f64,
}

/// Percent move from `reference` to `current`. A zero reference means there
/// is no baseline yet, which yields 0 rather than an error.
pub fn percent_change(current: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        return 0.0;
    }
    (current - reference) / reference * 100.0
}

/// Unrealized P&L of a spot position bought for `cost_amount` quote currency
/// at `cost_price`. Either field at zero means no open position.
pub fn spot_profit(cost_price: f64, cost_amount: f64, current_price: f64) -> SpotProfit {
    if cost_price == 0.0 || cost_amount == 0.0 {
        return SpotProfit::default();
    }

    let quantity = cost_amount / cost_price;
    let current_value = quantity * current_price;
    let profit = current_value - cost_amount;

    SpotProfit {
        profit,
        percent: profit / cost_amount * 100.0,
    }
}

/// Leverage-adjusted P&L of a futures position. The price move is negated for
/// shorts, scaled by leverage, and applied to the margin notional.
pub fn futures_profit(
    cost_price: f64,
    cost_amount: f64,
    leverage: u32,
    side: PositionSide,
    current_price: f64,
) -> FuturesProfit {
    if cost_price == 0.0 || cost_amount == 0.0 {
        return FuturesProfit::default();
    }

    let mut price_change_percent = (current_price - cost_price) / cost_price * 100.0;
    if side == PositionSide::Short {
        price_change_percent = -price_change_percent;
    }

    let percent = price_change_percent * leverage as f64;

    FuturesProfit {
        profit: cost_amount * percent / 100.0,
        percent,
        liquidation_price: liquidation_price(cost_price, leverage, side),
    }
}

/// Estimated forced-close price for a position opened at `cost_price`.
pub fn liquidation_price(cost_price: f64, leverage: u32, side: PositionSide) -> f64 {
    let offset = MARGIN_BUFFER / leverage as f64;
    match side {
        PositionSide::Long => cost_price * (1.0 - offset),
        PositionSide::Short => cost_price * (1.0 + offset),
    }
}

/// Classify the tick-to-tick move. No previous observation always reads flat.
pub fn classify_trend(current: f64, previous: f64) -> Trend {
    if previous == 0.0 {
        return Trend::Flat;
    }

    let percent = percent_change(current, previous);
    if percent > 1.0 {
        Trend::StrongUp
    } else if percent > 0.0 {
        Trend::Up
    } else if percent < -1.0 {
        Trend::StrongDown
    } else if percent < 0.0 {
        Trend::Down
    } else {
        Trend::Flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_change_guards_zero_reference() {
        assert_eq!(percent_change(123.0, 0.0), 0.0);
        assert_eq!(percent_change(0.0, 0.0), 0.0);
    }

    #[test]
    fn percent_change_basic() {
        assert!((percent_change(110.0, 100.0) - 10.0).abs() < 1e-9);
        assert!((percent_change(90.0, 100.0) + 10.0).abs() < 1e-9);
    }

    #[test]
    fn spot_profit_requires_open_position() {
        assert_eq!(spot_profit(0.0, 1000.0, 150.0), SpotProfit::default());
        assert_eq!(spot_profit(100.0, 0.0, 150.0), SpotProfit::default());
    }

    #[test]
    fn spot_profit_scenario() {
        // 1000 USDT bought at 100 -> 10 coins worth 1500 at 150.
        let p = spot_profit(100.0, 1000.0, 150.0);
        assert!((p.profit - 500.0).abs() < 1e-9);
        assert!((p.percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn futures_profit_requires_open_position() {
        let p = futures_profit(0.0, 500.0, 10, PositionSide::Long, 90.0);
        assert_eq!(p, FuturesProfit::default());
    }

    #[test]
    fn futures_short_mirrors_long() {
        let long = futures_profit(100.0, 500.0, 5, PositionSide::Long, 110.0);
        let short = futures_profit(100.0, 500.0, 5, PositionSide::Short, 110.0);
        assert!((long.percent + short.percent).abs() < 1e-9);
        assert!((long.profit + short.profit).abs() < 1e-9);
    }

    #[test]
    fn futures_long_liquidation_scenario() {
        // LONG 10x from 100: a 10% drop is a full loss of margin, and the
        // liquidation estimate sits at 100 * (1 - 0.09) = 91.
        let p = futures_profit(100.0, 1000.0, 10, PositionSide::Long, 90.0);
        assert!((p.percent + 100.0).abs() < 1e-9);
        assert!((p.profit + 1000.0).abs() < 1e-9);
        assert!((p.liquidation_price - 91.0).abs() < 1e-9);
    }

    #[test]
    fn liquidation_brackets_cost_price() {
        for leverage in [1, 2, 5, 10, 50] {
            assert!(liquidation_price(100.0, leverage, PositionSide::Long) < 100.0);
            assert!(liquidation_price(100.0, leverage, PositionSide::Short) > 100.0);
        }
    }

    #[test]
    fn trend_buckets() {
        assert_eq!(classify_trend(100.0, 0.0), Trend::Flat);
        assert_eq!(classify_trend(100.0, 100.0), Trend::Flat);
        assert_eq!(classify_trend(100.5, 100.0), Trend::Up);
        assert_eq!(classify_trend(102.0, 100.0), Trend::StrongUp);
        assert_eq!(classify_trend(99.5, 100.0), Trend::Down);
        assert_eq!(classify_trend(98.0, 100.0), Trend::StrongDown);
    }
}
