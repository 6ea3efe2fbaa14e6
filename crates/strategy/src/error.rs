use chrono::NaiveDate;
use optdesk_core::{ConfigError, OptionType, StrategyType};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::lifecycle::StrategyStatus;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid strategy config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("policy type {policy} does not match configured type {config}")]
    TypeMismatch {
        config: StrategyType,
        policy: StrategyType,
    },

    #[error("strategy must be ARMED to enter, is {0}")]
    NotArmed(StrategyStatus),

    #[error("entry requires at least one leg")]
    NoLegs,

    #[error("no expiry configured for leg")]
    MissingExpiry,

    #[error("no instrument for {underlying} {expiry} {strike} {option_type}")]
    InstrumentNotFound {
        underlying: String,
        expiry: NaiveDate,
        strike: Decimal,
        option_type: OptionType,
    },
}
