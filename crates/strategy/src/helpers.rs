//! Derived calculations policies use to make decisions.
//!
//! Each helper reads one consistent copy of the engine state. Premium-based
//! tests return `false` while no entry premium is set.

use optdesk_core::{MarketSnapshot, OptionType, Position};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::engine::StrategyEngine;
use crate::guards;

/// Rounds `price` to the nearest multiple of `interval`, halves rounding up.
#[must_use]
pub fn round_to_strike(price: Decimal, interval: Decimal) -> Decimal {
    if interval <= Decimal::ZERO {
        return price;
    }
    (price / interval).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * interval
}

impl StrategyEngine {
    /// `Σ unrealized + Σ realized`, missing values as zero.
    #[must_use]
    pub fn total_pnl(&self) -> Decimal {
        guards::total_pnl(&self.state.read().positions)
    }

    #[must_use]
    pub fn net_delta(&self) -> Decimal {
        guards::net_delta(&self.state.read().positions)
    }

    #[must_use]
    pub fn is_target_reached(&self) -> bool {
        let (premium, pnl) = self.premium_and_pnl();
        match (premium, self.config().target_percent) {
            (Some(premium), Some(target)) => pnl >= premium * target,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_stop_loss_hit(&self) -> bool {
        let (premium, pnl) = self.premium_and_pnl();
        match (premium, self.config().stop_loss_multiplier) {
            (Some(premium), Some(multiplier)) => pnl <= -(premium * multiplier),
            _ => false,
        }
    }

    /// True once days-to-expiry is at or below the configured exit day.
    /// Uses the configured expiry, falling back to the snapshot's.
    #[must_use]
    pub fn should_exit_for_dte(&self, snapshot: &MarketSnapshot) -> bool {
        if self.entry_premium().is_none() {
            return false;
        }
        let Some(dte_exit) = self.config().dte_exit else {
            return false;
        };
        let Some(expiry) = self.config().expiry.or(snapshot.expiry) else {
            return false;
        };
        let dte = (expiry - snapshot.timestamp.date_naive()).num_days();
        dte <= dte_exit
    }

    /// ATM strike for `price` on the configured strike grid.
    #[must_use]
    pub fn round_to_strike(&self, price: Decimal) -> Decimal {
        round_to_strike(price, self.config().strike_interval)
    }

    #[must_use]
    pub fn find_short_leg(&self, option_type: OptionType) -> Option<Position> {
        self.find_leg(option_type, Position::is_short)
    }

    #[must_use]
    pub fn find_long_leg(&self, option_type: OptionType) -> Option<Position> {
        self.find_leg(option_type, Position::is_long)
    }

    fn find_leg(&self, option_type: OptionType, side: fn(&Position) -> bool) -> Option<Position> {
        self.state
            .read()
            .positions
            .iter()
            .find(|p| side(*p) && p.option_type() == Some(option_type))
            .cloned()
    }

    fn premium_and_pnl(&self) -> (Option<Decimal>, Decimal) {
        let state = self.state.read();
        (state.entry_premium, guards::total_pnl(&state.positions))
    }
}
