use chrono::{DateTime, Utc};
use optdesk_core::{OptionSymbol, OptionType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A strategy's claim on a slice of a broker position.
///
/// Legs are never deleted. Detaching clears `position_id` and stamps
/// `detached_at`; the record stays for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyLeg {
    pub id: Uuid,
    pub strategy_id: String,
    pub position_id: Option<String>,
    /// Signed, same sign as the position it draws from.
    pub quantity: i64,
    pub option_type: Option<OptionType>,
    pub strike: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub detached_at: Option<DateTime<Utc>>,
}

impl StrategyLeg {
    /// Creates an attached leg, denormalizing option type and strike from
    /// the trading symbol when it parses.
    #[must_use]
    pub fn new(
        strategy_id: impl Into<String>,
        position_id: impl Into<String>,
        trading_symbol: &str,
        quantity: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let parsed = OptionSymbol::parse(trading_symbol);
        Self {
            id: Uuid::new_v4(),
            strategy_id: strategy_id.into(),
            position_id: Some(position_id.into()),
            quantity,
            option_type: parsed.as_ref().map(|p| p.option_type),
            strike: parsed.and_then(|p| p.strike),
            created_at,
            detached_at: None,
        }
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.position_id.is_some()
    }

    #[must_use]
    pub fn links(&self, position_id: &str) -> bool {
        self.position_id.as_deref() == Some(position_id)
    }

    pub(crate) fn detach(&mut self, at: DateTime<Utc>) {
        self.position_id = None;
        self.detached_at = Some(at);
    }
}
