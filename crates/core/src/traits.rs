use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::position::Position;
use crate::types::{Instrument, OptionType};

/// Read access to broker-reported positions.
pub trait PositionSource: Send + Sync {
    fn position(&self, position_id: &str) -> Option<Position>;

    /// All positions currently reported, ordered by id.
    fn positions(&self) -> Vec<Position>;
}

/// Resolves option contract coordinates to a tradable instrument.
pub trait InstrumentResolver: Send + Sync {
    /// Returns `None` when no listed contract matches.
    fn resolve(
        &self,
        underlying: &str,
        expiry: NaiveDate,
        strike: Decimal,
        option_type: OptionType,
    ) -> Option<Instrument>;
}
