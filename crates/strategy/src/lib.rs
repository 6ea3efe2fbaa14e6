//! Strategy lifecycle engine: guarded evaluation, policy dispatch, entry and
//! exit through the multi-leg executor, and a scheduler that drives it.

pub mod adoption;
pub mod engine;
pub mod entry;
pub mod error;
pub mod guards;
pub mod helpers;
pub mod lifecycle;
pub mod policy;
pub mod report;
pub mod scheduler;
pub mod straddle;

#[cfg(test)]
mod testing;

pub use engine::{Evaluation, StrategyEngine};
pub use entry::LegTemplate;
pub use error::EngineError;
pub use guards::AutoPauseTrigger;
pub use helpers::round_to_strike;
pub use lifecycle::StrategyStatus;
pub use policy::{StrategyPolicy, DEFAULT_STALE_DATA_THRESHOLD};
pub use report::StrategyReport;
pub use scheduler::{SnapshotBoard, SnapshotProvider, StrategyScheduler, TickOutcome, TickResult};
pub use straddle::StraddlePolicy;
