//! In-memory instrument master.

use chrono::NaiveDate;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::traits::InstrumentResolver;
use crate::types::{Instrument, OptionType};

type ContractKey = (String, NaiveDate, Decimal, OptionType);

/// Resolver backed by a fixed set of instruments loaded up front.
#[derive(Debug, Default)]
pub struct StaticInstrumentResolver {
    instruments: RwLock<HashMap<ContractKey, Instrument>>,
}

impl StaticInstrumentResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_instruments(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        let resolver = Self::new();
        for instrument in instruments {
            resolver.insert(instrument);
        }
        resolver
    }

    pub fn insert(&self, instrument: Instrument) {
        let key = (
            instrument.underlying.to_ascii_uppercase(),
            instrument.expiry,
            instrument.strike.normalize(),
            instrument.option_type,
        );
        self.instruments.write().insert(key, instrument);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }
}

impl InstrumentResolver for StaticInstrumentResolver {
    fn resolve(
        &self,
        underlying: &str,
        expiry: NaiveDate,
        strike: Decimal,
        option_type: OptionType,
    ) -> Option<Instrument> {
        let key = (
            underlying.to_ascii_uppercase(),
            expiry,
            strike.normalize(),
            option_type,
        );
        self.instruments.read().get(&key).cloned()
    }
}
