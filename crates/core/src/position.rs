use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::symbol::option_type_of;
use crate::traits::PositionSource;
use crate::types::{Greeks, OptionType, OrderSide};

/// A broker-reported or locally tracked holding.
///
/// `quantity` is signed (negative = short) and never zero for a tracked
/// position; flat positions are removed rather than kept at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub trading_symbol: String,
    pub instrument_token: u64,
    pub quantity: i64,
    pub average_price: Option<Decimal>,
    pub last_price: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
    pub greeks: Option<Greeks>,
    pub last_updated: Option<DateTime<Utc>>,
    pub strategy_id: Option<String>,
}

impl Position {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        trading_symbol: impl Into<String>,
        instrument_token: u64,
        quantity: i64,
        average_price: Option<Decimal>,
    ) -> Self {
        Self {
            id: id.into(),
            trading_symbol: trading_symbol.into(),
            instrument_token,
            quantity,
            average_price,
            last_price: None,
            unrealized_pnl: None,
            realized_pnl: None,
            greeks: None,
            last_updated: None,
            strategy_id: None,
        }
    }

    #[must_use]
    pub fn with_last_updated(mut self, at: DateTime<Utc>) -> Self {
        self.last_updated = Some(at);
        self
    }

    #[must_use]
    pub fn with_greeks(mut self, greeks: Greeks) -> Self {
        self.greeks = Some(greeks);
        self
    }

    #[must_use]
    pub fn with_unrealized_pnl(mut self, pnl: Decimal) -> Self {
        self.unrealized_pnl = Some(pnl);
        self
    }

    #[must_use]
    pub fn with_realized_pnl(mut self, pnl: Decimal) -> Self {
        self.realized_pnl = Some(pnl);
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy_id: impl Into<String>) -> Self {
        self.strategy_id = Some(strategy_id.into());
        self
    }

    #[must_use]
    pub const fn is_short(&self) -> bool {
        self.quantity < 0
    }

    #[must_use]
    pub const fn is_long(&self) -> bool {
        self.quantity > 0
    }

    #[must_use]
    pub fn option_type(&self) -> Option<OptionType> {
        option_type_of(&self.trading_symbol)
    }

    /// A position is stale when it has never been updated or its last update
    /// is older than `threshold`. Timestamps in the future count as fresh.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self.last_updated {
            None => true,
            Some(updated) => match (now - updated).to_std() {
                Ok(age) => age > threshold,
                Err(_) => false,
            },
        }
    }

    /// Unrealized plus realized P&L, missing values counted as zero.
    #[must_use]
    pub fn total_pnl(&self) -> Decimal {
        self.unrealized_pnl.unwrap_or(Decimal::ZERO) + self.realized_pnl.unwrap_or(Decimal::ZERO)
    }

    /// The share of this position a claim of `quantity` represents: same
    /// contract and prices, P&L scaled by `quantity / self.quantity`.
    #[must_use]
    pub fn slice(&self, quantity: i64) -> Self {
        let mut slice = self.clone();
        slice.quantity = quantity;
        if self.quantity != 0 && quantity != self.quantity {
            let (claimed, held) = (Decimal::from(quantity), Decimal::from(self.quantity));
            slice.unrealized_pnl = self.unrealized_pnl.map(|pnl| pnl * claimed / held);
            slice.realized_pnl = self.realized_pnl.map(|pnl| pnl * claimed / held);
        }
        slice
    }

    /// `delta × quantity`, or `None` when greeks are unavailable.
    #[must_use]
    pub fn delta_exposure(&self) -> Option<Decimal> {
        self.greeks
            .as_ref()
            .map(|g| g.delta * Decimal::from(self.quantity))
    }
}

/// Quantity-weighted average of `average_price` over `positions`.
///
/// Weights are absolute quantities. Positions without an average price are
/// excluded from both numerator and denominator; `None` when nothing remains.
#[must_use]
pub fn weighted_entry_premium(positions: &[Position]) -> Option<Decimal> {
    let (value, weight) = positions
        .iter()
        .filter_map(|p| {
            p.average_price
                .map(|price| (price, Decimal::from(p.quantity.unsigned_abs())))
        })
        .fold((Decimal::ZERO, Decimal::ZERO), |(value, weight), (price, qty)| {
            (value + price * qty, weight + qty)
        });

    if weight.is_zero() {
        None
    } else {
        Some(value / weight)
    }
}

// =============================================================================
// Broker position book
// =============================================================================

/// An execution reported by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub trading_symbol: String,
    pub instrument_token: u64,
    pub side: OrderSide,
    /// Unsigned filled quantity.
    pub quantity: i64,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Broker-reported positions keyed by position id.
///
/// Fed by the tick/fill stream; read by the allocation ledger through
/// [`PositionSource`]. Position ids are the trading symbol for positions
/// opened through [`PositionBook::apply_fill`].
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: RwLock<HashMap<String, Position>>,
}

impl PositionBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a broker-reported position. A zero quantity
    /// removes it.
    pub fn upsert(&self, position: Position) {
        let mut positions = self.positions.write();
        if position.quantity == 0 {
            positions.remove(&position.id);
        } else {
            positions.insert(position.id.clone(), position);
        }
    }

    pub fn remove(&self, position_id: &str) -> Option<Position> {
        self.positions.write().remove(position_id)
    }

    /// Links a position to a strategy (or clears the link).
    pub fn assign_strategy(&self, position_id: &str, strategy_id: Option<String>) -> bool {
        match self.positions.write().get_mut(position_id) {
            Some(position) => {
                position.strategy_id = strategy_id;
                true
            }
            None => false,
        }
    }

    /// Marks a position to the latest traded price.
    pub fn update_quote(&self, position_id: &str, last_price: Decimal, at: DateTime<Utc>) -> bool {
        let mut positions = self.positions.write();
        let Some(position) = positions.get_mut(position_id) else {
            return false;
        };
        position.last_price = Some(last_price);
        if let Some(avg) = position.average_price {
            position.unrealized_pnl = Some((last_price - avg) * Decimal::from(position.quantity));
        }
        position.last_updated = Some(at);
        true
    }

    /// Applies a fill and returns the realized P&L when it reduces or closes
    /// an existing position, `None` when it opens or adds.
    pub fn apply_fill(&self, fill: &Fill) -> Option<Decimal> {
        let signed = match fill.side {
            OrderSide::Buy => fill.quantity,
            OrderSide::Sell => -fill.quantity,
        };
        if signed == 0 {
            return None;
        }

        let mut positions = self.positions.write();
        let Some(position) = positions.get_mut(&fill.trading_symbol) else {
            // Opening a new position
            let position = Position::new(
                fill.trading_symbol.clone(),
                fill.trading_symbol.clone(),
                fill.instrument_token,
                signed,
                Some(fill.price),
            )
            .with_last_updated(fill.timestamp);
            positions.insert(fill.trading_symbol.clone(), position);
            return None;
        };

        position.last_updated = Some(fill.timestamp);
        let avg = position.average_price.unwrap_or(fill.price);

        // Adding to an existing position in the same direction
        if position.quantity.signum() == signed.signum() {
            let held = Decimal::from(position.quantity.unsigned_abs());
            let added = Decimal::from(fill.quantity);
            position.average_price = Some((avg * held + fill.price * added) / (held + added));
            position.quantity += signed;
            return None;
        }

        // Reducing, closing, or flipping
        let close_qty = fill.quantity.min(position.quantity.abs());
        let direction = Decimal::from(position.quantity.signum());
        let pnl = (fill.price - avg) * Decimal::from(close_qty) * direction;
        position.realized_pnl = Some(position.realized_pnl.unwrap_or(Decimal::ZERO) + pnl);

        let previous_sign = position.quantity.signum();
        position.quantity += signed;

        if position.quantity == 0 {
            positions.remove(&fill.trading_symbol);
        } else if position.quantity.signum() != previous_sign {
            position.average_price = Some(fill.price);
        }

        Some(pnl)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.read().is_empty()
    }
}

impl PositionSource for PositionBook {
    fn position(&self, position_id: &str) -> Option<Position> {
        self.positions.read().get(position_id).cloned()
    }

    fn positions(&self) -> Vec<Position> {
        let mut all: Vec<Position> = self.positions.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}
