//! Periodic evaluation of registered strategies.
//!
//! Each tick fetches one snapshot per underlying and evaluates every armed
//! or active engine concurrently, each under its own timeout so a slow
//! broker cannot hold up the rest.

use async_trait::async_trait;
use futures_util::future::join_all;
use optdesk_core::{EngineConfig, MarketSnapshot};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::{Evaluation, StrategyEngine};
use crate::report::StrategyReport;

/// Source of the latest market snapshot per underlying.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn snapshot(&self, underlying: &str) -> Option<MarketSnapshot>;
}

/// In-memory provider fed by whoever receives market data.
#[derive(Debug, Default)]
pub struct SnapshotBoard {
    snapshots: RwLock<HashMap<String, MarketSnapshot>>,
}

impl SnapshotBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot for the snapshot's underlying.
    pub fn publish(&self, snapshot: MarketSnapshot) {
        self.snapshots
            .write()
            .insert(snapshot.underlying.clone(), snapshot);
    }
}

#[async_trait]
impl SnapshotProvider for SnapshotBoard {
    async fn snapshot(&self, underlying: &str) -> Option<MarketSnapshot> {
        self.snapshots.read().get(underlying).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    Evaluated(Evaluation),
    /// `evaluate` did not finish within the evaluation timeout.
    TimedOut,
    NoSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub strategy_id: String,
    pub result: TickResult,
}

pub struct StrategyScheduler {
    engines: RwLock<Vec<Arc<StrategyEngine>>>,
    provider: Arc<dyn SnapshotProvider>,
    tick: Duration,
    evaluation_timeout: Duration,
}

impl StrategyScheduler {
    #[must_use]
    pub fn new(provider: Arc<dyn SnapshotProvider>, config: &EngineConfig) -> Self {
        Self {
            engines: RwLock::new(Vec::new()),
            provider,
            tick: config.scheduler_tick(),
            evaluation_timeout: config.evaluation_timeout(),
        }
    }

    /// Returns `false` if an engine with the same id is already registered.
    pub fn register(&self, engine: Arc<StrategyEngine>) -> bool {
        let mut engines = self.engines.write();
        if engines.iter().any(|e| e.id() == engine.id()) {
            return false;
        }
        info!(strategy_id = %engine.id(), "strategy registered");
        engines.push(engine);
        true
    }

    pub fn unregister(&self, strategy_id: &str) -> Option<Arc<StrategyEngine>> {
        let mut engines = self.engines.write();
        let index = engines.iter().position(|e| e.id() == strategy_id)?;
        info!(strategy_id, "strategy unregistered");
        Some(engines.remove(index))
    }

    #[must_use]
    pub fn engine(&self, strategy_id: &str) -> Option<Arc<StrategyEngine>> {
        self.engines
            .read()
            .iter()
            .find(|e| e.id() == strategy_id)
            .cloned()
    }

    #[must_use]
    pub fn engine_ids(&self) -> Vec<String> {
        self.engines.read().iter().map(|e| e.id().to_string()).collect()
    }

    #[must_use]
    pub fn reports(&self) -> Vec<StrategyReport> {
        self.engines.read().iter().map(|e| e.report()).collect()
    }

    /// Evaluates every armed or active engine once.
    pub async fn tick_once(&self) -> Vec<TickOutcome> {
        let engines: Vec<Arc<StrategyEngine>> = self
            .engines
            .read()
            .iter()
            .filter(|e| e.status().is_evaluated())
            .cloned()
            .collect();
        if engines.is_empty() {
            return Vec::new();
        }

        let mut snapshots: HashMap<String, Option<MarketSnapshot>> = HashMap::new();
        for engine in &engines {
            let underlying = &engine.config().underlying;
            if !snapshots.contains_key(underlying) {
                let snapshot = self.provider.snapshot(underlying).await;
                snapshots.insert(underlying.clone(), snapshot);
            }
        }

        let evaluations = engines.iter().map(|engine| {
            let snapshot = snapshots
                .get(&engine.config().underlying)
                .and_then(Option::as_ref);
            self.evaluate_one(engine, snapshot)
        });
        join_all(evaluations).await
    }

    async fn evaluate_one(
        &self,
        engine: &StrategyEngine,
        snapshot: Option<&MarketSnapshot>,
    ) -> TickOutcome {
        let strategy_id = engine.id().to_string();
        let Some(snapshot) = snapshot else {
            debug!(strategy_id = %strategy_id, "no snapshot for underlying");
            return TickOutcome {
                strategy_id,
                result: TickResult::NoSnapshot,
            };
        };

        let result =
            match tokio::time::timeout(self.evaluation_timeout, engine.evaluate(snapshot)).await {
                Ok(evaluation) => TickResult::Evaluated(evaluation),
                Err(_) => {
                    warn!(
                        strategy_id = %strategy_id,
                        timeout_secs = self.evaluation_timeout.as_secs(),
                        "evaluation timed out"
                    );
                    TickResult::TimedOut
                }
            };
        TickOutcome {
            strategy_id,
            result,
        }
    }

    /// Ticks until `shutdown` becomes `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_secs = self.tick.as_secs(),
            strategies = self.engines.read().len(),
            "scheduler started"
        );
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let outcomes = self.tick_once().await;
                    debug!(evaluated = outcomes.len(), "scheduler tick");
                }
            }
        }
        info!("scheduler stopped");
    }
}
