//! Pure guard checks used by `evaluate`.

use chrono::{DateTime, Utc};
use optdesk_core::{Position, StrategyConfig};
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;

/// Why an active strategy paused itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "trigger", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutoPauseTrigger {
    PnlFloor { pnl: Decimal, threshold: Decimal },
    DeltaCeiling { net_delta: Decimal, threshold: Decimal },
}

/// True when at least `window` has passed since `since`. A `since` in the
/// future never counts as elapsed.
#[must_use]
pub fn elapsed_at_least(since: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    (now - since).to_std().is_ok_and(|age| age >= window)
}

/// Monitoring-interval guard. The first evaluation always proceeds.
#[must_use]
pub fn interval_elapsed(last: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> bool {
    last.map_or(true, |last| elapsed_at_least(last, now, interval))
}

/// Adjustment cooldown. Never adjusted means no cooldown.
#[must_use]
pub fn cooldown_elapsed(last: Option<DateTime<Utc>>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    last.map_or(true, |last| elapsed_at_least(last, now, cooldown))
}

/// Any stale position makes the whole set stale; an empty set never is.
#[must_use]
pub fn has_stale_data(positions: &[Position], now: DateTime<Utc>, threshold: Duration) -> bool {
    positions.iter().any(|p| p.is_stale(now, threshold))
}

#[must_use]
pub fn total_pnl(positions: &[Position]) -> Decimal {
    positions.iter().map(Position::total_pnl).sum()
}

/// `Σ delta × quantity` over positions with greeks.
#[must_use]
pub fn net_delta(positions: &[Position]) -> Decimal {
    positions.iter().filter_map(Position::delta_exposure).sum()
}

/// First breached auto-pause threshold, P&L checked before delta.
#[must_use]
pub fn auto_pause_trigger(config: &StrategyConfig, positions: &[Position]) -> Option<AutoPauseTrigger> {
    if let Some(threshold) = config.auto_pause_pnl_threshold {
        let pnl = total_pnl(positions);
        if pnl <= threshold {
            return Some(AutoPauseTrigger::PnlFloor { pnl, threshold });
        }
    }
    if let Some(threshold) = config.auto_pause_delta_threshold {
        let net_delta = net_delta(positions);
        if net_delta.abs() > threshold {
            return Some(AutoPauseTrigger::DeltaCeiling {
                net_delta,
                threshold,
            });
        }
    }
    None
}
