//! Contracts between the ledger and the strategies it allocates to.

use optdesk_core::{OptionType, Position, StrategyType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::leg::StrategyLeg;

/// A strategy the ledger can attach positions to.
///
/// Attaching and releasing recompute the entry premium in the same critical
/// section as the position change.
pub trait AdoptionTarget: Send + Sync {
    fn strategy_id(&self) -> &str;
    fn strategy_type(&self) -> StrategyType;
    fn underlying(&self) -> &str;

    /// Snapshot of the strategy's current positions.
    fn positions(&self) -> Vec<Position>;

    /// Appends the position unless one with the same id is already held or
    /// its quantity is zero, then recomputes the entry premium.
    fn attach_position(&self, position: Position) -> PositionChange;

    /// Removes the position by id, then recomputes the entry premium.
    fn release_position(&self, position_id: &str) -> PositionChange;
}

/// Effect of attaching or releasing a position on an [`AdoptionTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionChange {
    /// Whether the held positions changed.
    pub changed: bool,
    /// Entry premium after the change.
    pub entry_premium: Option<Decimal>,
}

/// Precondition failures. Returned before anything is written.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("position {0} not found")]
    PositionNotFound(String),

    #[error("adoption quantity must be non-zero")]
    ZeroQuantity,

    #[error("quantity {requested} has the wrong sign for position quantity {position}")]
    SignMismatch { requested: i64, position: i64 },

    #[error("quantity {requested} exceeds unmanaged quantity {unmanaged}")]
    ExceedsUnmanaged { requested: i64, unmanaged: i64 },

    #[error("position {position_id} is already linked to strategy {strategy_id}")]
    AlreadyLinked {
        strategy_id: String,
        position_id: String,
    },

    #[error("strategy {strategy_id} holds no leg on position {position_id}")]
    NotLinked {
        strategy_id: String,
        position_id: String,
    },
}

/// Non-fatal adoption findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdoptionWarning {
    UnderlyingMismatch {
        expected: String,
        actual: String,
    },
    OptionSideMismatch {
        option_type: OptionType,
        strategy_type: StrategyType,
    },
    QuantityMismatch {
        adopted: i64,
        existing: i64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdoptionOutcome {
    pub leg: StrategyLeg,
    pub entry_premium: Option<Decimal>,
    pub warnings: Vec<AdoptionWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetachOutcome {
    pub success: bool,
    pub leg: StrategyLeg,
    pub entry_premium: Option<Decimal>,
}
