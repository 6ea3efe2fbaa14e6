use anyhow::Result;
use async_trait::async_trait;
use optdesk_core::{MarketSnapshot, OrderRequest, StrategyType};
use std::time::Duration;

use crate::engine::StrategyEngine;

pub const DEFAULT_STALE_DATA_THRESHOLD: Duration = Duration::from_secs(5);

/// Trading rules for one strategy type.
///
/// The engine owns lifecycle, guards and execution; a policy only answers
/// the four questions below. Callbacks receive the engine so they can use
/// its derived helpers and position snapshot, and must not assume they hold
/// any engine lock.
#[async_trait]
pub trait StrategyPolicy: Send + Sync {
    fn strategy_type(&self) -> StrategyType;

    /// Minimum time between two dispatched evaluations.
    fn monitoring_interval(&self) -> Duration;

    fn stale_data_threshold(&self) -> Duration {
        DEFAULT_STALE_DATA_THRESHOLD
    }

    fn should_enter(&self, engine: &StrategyEngine, snapshot: &MarketSnapshot) -> bool;

    fn build_entry_orders(
        &self,
        engine: &StrategyEngine,
        snapshot: &MarketSnapshot,
    ) -> Vec<OrderRequest>;

    fn should_exit(&self, engine: &StrategyEngine, snapshot: &MarketSnapshot) -> bool;

    /// Structural changes (roll, shift, re-entry). Implementations call
    /// [`StrategyEngine::record_adjustment`] when they change something.
    async fn adjust(&self, engine: &StrategyEngine, snapshot: &MarketSnapshot) -> Result<()>;

    /// Strategy types this one can be converted into in place.
    fn supported_morphs(&self) -> Vec<StrategyType> {
        Vec::new()
    }
}
