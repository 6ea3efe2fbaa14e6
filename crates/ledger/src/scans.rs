//! Reconciliation scans over the ledger and broker positions.

use optdesk_core::{Position, PositionSource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

use crate::ledger::AllocationLedger;

/// A position linked to a strategy that is no longer active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleAssignment {
    pub position: Position,
    pub strategy_id: String,
}

/// A position whose attached legs claim more than it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverAllocation {
    pub position_id: String,
    /// Zero when the broker no longer reports the position.
    pub position_quantity: i64,
    pub allocated_quantity: i64,
}

impl AllocationLedger {
    /// Broker positions with no strategy link at all: no `strategy_id` and
    /// no attached leg.
    #[must_use]
    pub fn find_orphan_positions(&self, source: &dyn PositionSource) -> Vec<Position> {
        let allocated = self.get_all_allocations();
        source
            .positions()
            .into_iter()
            .filter(|p| p.strategy_id.is_none() && !allocated.contains_key(&p.id))
            .collect()
    }

    /// Positions linked to a strategy outside `active_strategy_ids`, either
    /// through `strategy_id` or through an attached leg. Orphans are never
    /// included.
    #[must_use]
    pub fn find_stale_assignments(
        &self,
        source: &dyn PositionSource,
        active_strategy_ids: &HashSet<String>,
    ) -> Vec<StaleAssignment> {
        let legs = self.legs.read();
        let mut stale = Vec::new();

        for position in source.positions() {
            let mut owners: Vec<&str> = legs
                .iter()
                .filter(|leg| leg.links(&position.id))
                .map(|leg| leg.strategy_id.as_str())
                .collect();
            if let Some(owner) = position.strategy_id.as_deref() {
                owners.push(owner);
            }
            owners.sort_unstable();
            owners.dedup();

            for owner in owners {
                if !active_strategy_ids.contains(owner) {
                    stale.push(StaleAssignment {
                        position: position.clone(),
                        strategy_id: owner.to_string(),
                    });
                }
            }
        }
        stale
    }

    /// Positions where `|allocated| > |position quantity|` or the claimed
    /// quantity has the opposite sign. Also lists legs still attached to
    /// positions the broker no longer reports.
    #[must_use]
    pub fn over_allocations(&self, source: &dyn PositionSource) -> Vec<OverAllocation> {
        let allocations: BTreeMap<String, i64> = self.get_all_allocations().into_iter().collect();

        let mut found = Vec::new();
        for (position_id, allocated) in allocations {
            let held = source.position(&position_id).map_or(0, |p| p.quantity);
            let over = allocated.abs() > held.abs()
                || (allocated != 0 && allocated.signum() != held.signum());
            if over {
                warn!(
                    %position_id,
                    position_quantity = held,
                    allocated_quantity = allocated,
                    "over-allocated position"
                );
                found.push(OverAllocation {
                    position_id,
                    position_quantity: held,
                    allocated_quantity: allocated,
                });
            }
        }
        found
    }
}
