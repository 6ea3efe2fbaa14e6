//! Lets the allocation ledger attach broker positions to an engine.

use optdesk_core::{weighted_entry_premium, Position, StrategyType};
use optdesk_ledger::{AdoptionTarget, PositionChange};

use crate::engine::StrategyEngine;

impl AdoptionTarget for StrategyEngine {
    fn strategy_id(&self) -> &str {
        self.id()
    }

    fn strategy_type(&self) -> StrategyType {
        StrategyEngine::strategy_type(self)
    }

    fn underlying(&self) -> &str {
        &self.config().underlying
    }

    fn positions(&self) -> Vec<Position> {
        self.get_positions()
    }

    fn attach_position(&self, position: Position) -> PositionChange {
        let mut state = self.state.write();
        let changed =
            position.quantity != 0 && !state.positions.iter().any(|p| p.id == position.id);
        if changed {
            state.positions.push(position);
        }
        state.entry_premium = weighted_entry_premium(&state.positions);
        PositionChange {
            changed,
            entry_premium: state.entry_premium,
        }
    }

    fn release_position(&self, position_id: &str) -> PositionChange {
        let mut state = self.state.write();
        let before = state.positions.len();
        state.positions.retain(|p| p.id != position_id);
        state.entry_premium = weighted_entry_premium(&state.positions);
        PositionChange {
            changed: state.positions.len() != before,
            entry_premium: state.entry_premium,
        }
    }
}
