//! Position allocation ledger.
//!
//! Tracks which strategies claim which slices of shared broker positions.

pub mod adoption;
pub mod leg;
pub mod ledger;
pub mod scans;

pub use adoption::{
    AdoptionOutcome, AdoptionTarget, AdoptionWarning, AllocationError, DetachOutcome,
    PositionChange,
};
pub use leg::StrategyLeg;
pub use ledger::AllocationLedger;
pub use scans::{OverAllocation, StaleAssignment};
