use chrono::{DateTime, Utc};
use optdesk_core::StrategyType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::StrategyEngine;
use crate::guards;
use crate::lifecycle::StrategyStatus;

/// Point-in-time summary of one strategy for dashboards and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyReport {
    pub id: String,
    pub name: String,
    pub strategy_type: StrategyType,
    pub underlying: String,
    pub status: StrategyStatus,
    pub position_count: usize,
    pub total_pnl: Decimal,
    pub net_delta: Decimal,
    pub entry_premium: Option<Decimal>,
    pub entry_time: Option<DateTime<Utc>>,
    pub last_evaluation_time: Option<DateTime<Utc>>,
    pub last_adjustment_time: Option<DateTime<Utc>>,
}

impl StrategyEngine {
    /// Builds a report from one consistent read of the state.
    #[must_use]
    pub fn report(&self) -> StrategyReport {
        let state = self.state.read();
        StrategyReport {
            id: self.id().to_string(),
            name: self.name().to_string(),
            strategy_type: self.strategy_type(),
            underlying: self.config().underlying.clone(),
            status: state.status,
            position_count: state.positions.len(),
            total_pnl: guards::total_pnl(&state.positions),
            net_delta: guards::net_delta(&state.positions),
            entry_premium: state.entry_premium,
            entry_time: state.entry_time,
            last_evaluation_time: state.last_evaluation_time,
            last_adjustment_time: state.last_adjustment_time,
        }
    }
}
