use chrono::Utc;
use uuid::Uuid;

use crate::metrics;
use crate::model::{AlertEvent, AlertKind, SpotEntry};

/// Threshold pair for one instrument. A zero threshold disables that side.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertThresholds {
    pub high: f64,
    pub low: f64,
}

/// Evaluate the alert rule for one spot price observation.
///
/// The upper bound is checked before the lower bound and at most one event
/// fires per call. `entry.last_alert_price` records the price of the last
/// firing; a new event on the same side only fires after the price has
/// retreated back across the threshold, so an oscillation around a single
/// threshold produces one notification per crossing rather than one per tick.
///
/// `entry.last_price` is advanced unconditionally afterwards, whether or not
/// an event fired.
pub fn check_price_alert(
    pair: &str,
    display_name: &str,
    thresholds: AlertThresholds,
    entry: &mut SpotEntry,
    current_price: f64,
) -> Option<AlertEvent> {
    let AlertThresholds { high, low } = thresholds;
    let last_alert = entry.last_alert_price;

    let kind = if high > 0.0 && current_price >= high && (last_alert == 0.0 || last_alert < high) {
        Some((AlertKind::BreachedHigh, high))
    } else if low > 0.0 && current_price <= low && (last_alert == 0.0 || last_alert > low) {
        Some((AlertKind::BreachedLow, low))
    } else {
        None
    };

    let event = kind.map(|(kind, threshold)| {
        entry.last_alert_price = current_price;
        build_event(pair, display_name, kind, current_price, entry.last_price, threshold)
    });

    if event.is_none() && last_alert != 0.0 {
        // Price retreated back across the threshold that fired: the excursion
        // is over, so the side re-arms for the next crossing.
        let high_rearmed = high > 0.0 && last_alert >= high && current_price < high;
        let low_rearmed = low > 0.0 && last_alert <= low && current_price > low;
        if high_rearmed || low_rearmed {
            entry.last_alert_price = 0.0;
        }
    }

    entry.last_price = current_price;
    event
}

fn build_event(
    pair: &str,
    display_name: &str,
    kind: AlertKind,
    current_price: f64,
    previous_price: f64,
    threshold: f64,
) -> AlertEvent {
    let change_percent = metrics::percent_change(current_price, previous_price);
    let trend = metrics::classify_trend(current_price, previous_price);

    AlertEvent {
        id: Uuid::new_v4().to_string(),
        kind,
        pair: pair.to_string(),
        title: format!("{} {} {}", display_name, trend.arrow(), kind.headline()),
        subtitle: trend.describe(change_percent),
        message: format!(
            "Current price: {current_price:.2} USDT\nTarget price: {threshold:.2} USDT\nChange: {change_percent:+.2}%"
        ),
        price: current_price,
        threshold,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds(high: f64, low: f64) -> AlertThresholds {
        AlertThresholds { high, low }
    }

    fn run_sequence(t: AlertThresholds, prices: &[f64]) -> Vec<Option<AlertKind>> {
        let mut entry = SpotEntry::default();
        prices
            .iter()
            .map(|&p| check_price_alert("BTCUSDT", "Bitcoin", t, &mut entry, p).map(|e| e.kind))
            .collect()
    }

    #[test]
    fn fires_once_per_monotonic_crossing() {
        let fired = run_sequence(thresholds(100.0, 0.0), &[95.0, 101.0, 102.0, 103.0]);
        assert_eq!(
            fired,
            vec![None, Some(AlertKind::BreachedHigh), None, None]
        );
    }

    #[test]
    fn rearms_after_retreat() {
        let fired = run_sequence(thresholds(100.0, 0.0), &[95.0, 101.0, 95.0, 101.0]);
        let count = fired.iter().flatten().count();
        assert_eq!(count, 2);
    }

    #[test]
    fn low_side_fires_and_rearms() {
        let fired = run_sequence(thresholds(0.0, 50.0), &[60.0, 49.0, 48.0, 55.0, 50.0]);
        assert_eq!(
            fired,
            vec![
                None,
                Some(AlertKind::BreachedLow),
                None,
                None,
                Some(AlertKind::BreachedLow)
            ]
        );
    }

    #[test]
    fn high_takes_priority_over_low() {
        // Degenerate config where both sides match: only the high fires.
        let fired = run_sequence(thresholds(100.0, 200.0), &[150.0]);
        assert_eq!(fired, vec![Some(AlertKind::BreachedHigh)]);
    }

    #[test]
    fn zero_thresholds_never_fire() {
        let fired = run_sequence(thresholds(0.0, 0.0), &[1.0, 1_000_000.0, 0.0001]);
        assert!(fired.iter().all(|f| f.is_none()));
    }

    #[test]
    fn last_price_advances_even_without_event() {
        let mut entry = SpotEntry::default();
        check_price_alert("BTCUSDT", "Bitcoin", thresholds(0.0, 0.0), &mut entry, 42.0);
        assert_eq!(entry.last_price, 42.0);
        assert_eq!(entry.last_alert_price, 0.0);
    }

    #[test]
    fn event_text_includes_price_and_threshold() {
        let mut entry = SpotEntry::default();
        entry.last_price = 95.0;
        let event = check_price_alert(
            "BTCUSDT",
            "Bitcoin",
            thresholds(100.0, 0.0),
            &mut entry,
            101.0,
        )
        .unwrap();
        assert!(event.message.contains("101.00"));
        assert!(event.message.contains("100.00"));
        assert!(event.title.contains("Bitcoin"));
        assert_eq!(entry.last_alert_price, 101.0);
    }
}
