//! Per-strategy lifecycle engine.
//!
//! One [`StrategyEngine`] drives one strategy instance. `evaluate` may be
//! called concurrently from the scheduler, tick handlers and user commands;
//! all mutable state sits behind a single lock that is never held across
//! an await or a policy callback.

use chrono::{DateTime, Utc};
use optdesk_core::{
    weighted_entry_premium, Clock, DecisionDetails, DecisionEvent, DecisionKind, DecisionSink,
    LoggingDecisionSink, MarketSnapshot, OrderRequest, OrderSide, Position, StrategyConfig,
    StrategyType, SystemClock,
};
use optdesk_execution::{ExecutionPhase, ExecutionPriority, MultiLegResult, OrderExecutor};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::error::EngineError;
use crate::guards::{self, AutoPauseTrigger};
use crate::lifecycle::StrategyStatus;
use crate::policy::StrategyPolicy;

const DEFAULT_EXIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Mutable strategy state. Status and positions change together under one
/// write lock so readers never see an inconsistent pair.
#[derive(Debug, Clone, Default)]
pub(crate) struct EngineState {
    pub status: StrategyStatus,
    pub positions: Vec<Position>,
    pub entry_premium: Option<Decimal>,
    pub entry_time: Option<DateTime<Utc>>,
    pub last_evaluation_time: Option<DateTime<Utc>>,
    pub last_adjustment_time: Option<DateTime<Utc>>,
}

/// What one `evaluate` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Status does not allow evaluation.
    NotEvaluated(StrategyStatus),
    /// Monitoring interval has not elapsed since the last evaluation.
    IntervalNotElapsed,
    /// A tracked position is stale; policy not consulted.
    StaleData,
    /// Policy declined to enter, or produced no orders.
    NoEntry,
    EntryFailed,
    Entered,
    /// Policy asked to exit; exit orders submitted.
    Closed,
    AutoPaused,
    CoolingDown,
    Adjusted,
    /// The policy's adjustment returned an error.
    AdjustFailed,
}

pub struct StrategyEngine {
    id: String,
    name: String,
    config: StrategyConfig,
    policy: Box<dyn StrategyPolicy>,
    executor: Arc<dyn OrderExecutor>,
    sink: Arc<dyn DecisionSink>,
    clock: Arc<dyn Clock>,
    exit_timeout: Duration,
    stale_data_threshold: Option<Duration>,
    pub(crate) state: RwLock<EngineState>,
}

impl fmt::Debug for StrategyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyEngine")
            .field("id", &self.id)
            .field("type", &self.config.strategy_type())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl StrategyEngine {
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the policy implements a
    /// different strategy type than the config declares.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        config: StrategyConfig,
        policy: Box<dyn StrategyPolicy>,
        executor: Arc<dyn OrderExecutor>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        if policy.strategy_type() != config.strategy_type() {
            return Err(EngineError::TypeMismatch {
                config: config.strategy_type(),
                policy: policy.strategy_type(),
            });
        }

        Ok(Self {
            id: id.into(),
            name: name.into(),
            config,
            policy,
            executor,
            sink: Arc::new(LoggingDecisionSink),
            clock: Arc::new(SystemClock),
            exit_timeout: DEFAULT_EXIT_TIMEOUT,
            stale_data_threshold: None,
            state: RwLock::new(EngineState::default()),
        })
    }

    #[must_use]
    pub fn with_decision_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn with_exit_timeout(mut self, timeout: Duration) -> Self {
        self.exit_timeout = timeout;
        self
    }

    /// Overrides the policy's stale-data threshold.
    #[must_use]
    pub const fn with_stale_data_threshold(mut self, threshold: Duration) -> Self {
        self.stale_data_threshold = Some(threshold);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn config(&self) -> &StrategyConfig {
        &self.config
    }

    #[must_use]
    pub const fn strategy_type(&self) -> StrategyType {
        self.config.strategy_type()
    }

    #[must_use]
    pub fn status(&self) -> StrategyStatus {
        self.state.read().status
    }

    #[must_use]
    pub fn entry_premium(&self) -> Option<Decimal> {
        self.state.read().entry_premium
    }

    #[must_use]
    pub fn entry_time(&self) -> Option<DateTime<Utc>> {
        self.state.read().entry_time
    }

    #[must_use]
    pub fn last_evaluation_time(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_evaluation_time
    }

    #[must_use]
    pub fn last_adjustment_time(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_adjustment_time
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn stale_data_threshold(&self) -> Duration {
        self.stale_data_threshold
            .unwrap_or_else(|| self.policy.stale_data_threshold())
    }

    pub(crate) fn executor(&self) -> &dyn OrderExecutor {
        self.executor.as_ref()
    }

    #[must_use]
    pub fn can_morph_to(&self, target: StrategyType) -> bool {
        self.policy.supported_morphs().contains(&target)
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    pub(crate) fn publish(&self, kind: DecisionKind, message: impl Into<String>, details: Value) {
        let details = match details {
            Value::Object(map) => map,
            Value::Null => DecisionDetails::new(),
            other => {
                let mut map = DecisionDetails::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self.sink.publish_decision(DecisionEvent {
            kind,
            message: message.into(),
            strategy_id: self.id.clone(),
            details,
            timestamp: self.clock.now(),
        });
    }

    fn reject_transition(&self, transition: &str, from: StrategyStatus) {
        self.publish(
            DecisionKind::TransitionRejected,
            format!("{transition} ignored in {from}"),
            json!({ "transition": transition, "status": from }),
        );
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// `CREATED → ARMED`. A no-op from any other state.
    pub fn arm(&self) -> bool {
        let from = {
            let mut state = self.state.write();
            let from = state.status;
            if from.can_arm() {
                state.status = StrategyStatus::Armed;
            }
            from
        };

        if from.can_arm() {
            self.publish(DecisionKind::Armed, "strategy armed", json!({ "from": from }));
            true
        } else {
            self.reject_transition("arm", from);
            false
        }
    }

    /// Any non-terminal state to `PAUSED`.
    pub fn pause(&self) -> bool {
        let from = {
            let mut state = self.state.write();
            let from = state.status;
            if from.can_pause() {
                state.status = StrategyStatus::Paused;
            }
            from
        };

        if from.can_pause() {
            self.publish(DecisionKind::Paused, "strategy paused", json!({ "from": from }));
            true
        } else {
            self.reject_transition("pause", from);
            false
        }
    }

    /// `PAUSED → ACTIVE`.
    pub fn resume(&self) -> bool {
        let from = {
            let mut state = self.state.write();
            let from = state.status;
            if from.can_resume() {
                state.status = StrategyStatus::Active;
            }
            from
        };

        if from.can_resume() {
            self.publish(DecisionKind::Resumed, "strategy resumed", json!({ "from": from }));
            true
        } else {
            self.reject_transition("resume", from);
            false
        }
    }

    /// Moves to `CLOSING` and submits exit orders for every position, buys
    /// first. The transition stands whatever the exit outcome; `None` when
    /// the strategy was already closing.
    pub async fn initiate_close(&self) -> Option<MultiLegResult> {
        let (from, positions) = {
            let mut state = self.state.write();
            let from = state.status;
            if !from.can_close() {
                (from, None)
            } else {
                state.status = StrategyStatus::Closing;
                (from, Some(state.positions.clone()))
            }
        };

        let Some(positions) = positions else {
            self.reject_transition("close", from);
            return None;
        };

        let orders = exit_orders(&positions);
        self.publish(
            DecisionKind::Closing,
            "closing strategy",
            json!({ "from": from, "legs": orders.len() }),
        );

        let result = self
            .executor
            .execute_buy_first_then_sell(
                orders,
                &self.id,
                ExecutionPhase::Exit,
                ExecutionPriority::High,
                self.exit_timeout,
            )
            .await;

        if result.success {
            self.publish(
                DecisionKind::Closing,
                "exit orders filled",
                json!({ "group_id": result.group_id.to_string() }),
            );
        } else {
            warn!(
                strategy_id = %self.id,
                group_id = %result.group_id,
                failed = result.failed_legs().len(),
                "exit submission failed, strategy left CLOSING"
            );
            self.publish(
                DecisionKind::Closing,
                "exit orders failed",
                json!({
                    "group_id": result.group_id.to_string(),
                    "failed_legs": result.failed_legs().len(),
                }),
            );
        }
        Some(result)
    }

    /// Marks a structural change by the policy and starts the cooldown.
    pub fn record_adjustment(&self, label: &str) {
        let now = self.clock.now();
        self.state.write().last_adjustment_time = Some(now);
        self.publish(
            DecisionKind::Adjustment,
            format!("adjustment: {label}"),
            json!({ "label": label }),
        );
    }

    /// Submits policy-built adjustment legs concurrently.
    pub async fn submit_adjustment(&self, orders: Vec<OrderRequest>) -> MultiLegResult {
        self.executor
            .execute_parallel(
                orders,
                &self.id,
                ExecutionPhase::Adjustment,
                ExecutionPriority::Normal,
            )
            .await
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Runs one guarded evaluation cycle against `snapshot`.
    pub async fn evaluate(&self, snapshot: &MarketSnapshot) -> Evaluation {
        let now = self.clock.now();
        let interval = self.policy.monitoring_interval();

        let (status, positions) = {
            let mut state = self.state.write();
            if !state.status.is_evaluated() {
                return Evaluation::NotEvaluated(state.status);
            }
            if !guards::interval_elapsed(state.last_evaluation_time, now, interval) {
                trace!(strategy_id = %self.id, "monitoring interval not elapsed");
                return Evaluation::IntervalNotElapsed;
            }
            state.last_evaluation_time = Some(now);
            (state.status, state.positions.clone())
        };

        if guards::has_stale_data(&positions, now, self.stale_data_threshold()) {
            debug!(
                strategy_id = %self.id,
                positions = positions.len(),
                "stale position data, skipping cycle"
            );
            return Evaluation::StaleData;
        }

        match status {
            StrategyStatus::Armed => self.evaluate_entry(snapshot).await,
            StrategyStatus::Active => self.evaluate_active(snapshot, &positions).await,
            other => Evaluation::NotEvaluated(other),
        }
    }

    async fn evaluate_entry(&self, snapshot: &MarketSnapshot) -> Evaluation {
        let should_enter = self.policy.should_enter(self, snapshot);
        self.publish(
            DecisionKind::EntryEval,
            if should_enter {
                "entry conditions met"
            } else {
                "entry conditions not met"
            },
            json!({
                "should_enter": should_enter,
                "spot": snapshot.spot_price.to_string(),
            }),
        );
        if !should_enter {
            return Evaluation::NoEntry;
        }

        let orders = self.policy.build_entry_orders(self, snapshot);
        if orders.is_empty() {
            debug!(strategy_id = %self.id, "policy built no entry orders");
            return Evaluation::NoEntry;
        }

        let result = self
            .executor
            .execute_parallel(
                orders,
                &self.id,
                ExecutionPhase::Entry,
                ExecutionPriority::Normal,
            )
            .await;

        if self.complete_entry(&result) {
            Evaluation::Entered
        } else {
            Evaluation::EntryFailed
        }
    }

    /// Applies an entry result. `ARMED → ACTIVE` on success.
    pub(crate) fn complete_entry(&self, result: &MultiLegResult) -> bool {
        if !result.success {
            self.publish(
                DecisionKind::EntryFailed,
                "entry orders failed, staying armed",
                json!({
                    "group_id": result.group_id.to_string(),
                    "failed_legs": result.failed_legs().len(),
                    "filled_legs": result.filled_legs().len(),
                }),
            );
            return false;
        }

        let now = self.clock.now();
        let from = {
            let mut state = self.state.write();
            let from = state.status;
            if from == StrategyStatus::Armed {
                state.status = StrategyStatus::Active;
                state.entry_time = Some(now);
            }
            from
        };

        if from == StrategyStatus::Armed {
            self.publish(
                DecisionKind::EntryExecuted,
                "entry orders filled, strategy active",
                json!({
                    "group_id": result.group_id.to_string(),
                    "legs": result.leg_results.len(),
                }),
            );
            true
        } else {
            warn!(
                strategy_id = %self.id,
                status = %from,
                "entry filled after status changed"
            );
            self.reject_transition("activate", from);
            false
        }
    }

    async fn evaluate_active(&self, snapshot: &MarketSnapshot, positions: &[Position]) -> Evaluation {
        if self.policy.should_exit(self, snapshot) {
            self.initiate_close().await;
            return Evaluation::Closed;
        }

        if let Some(trigger) = guards::auto_pause_trigger(&self.config, positions) {
            self.auto_pause(trigger);
            return Evaluation::AutoPaused;
        }

        let now = self.clock.now();
        let last = self.state.read().last_adjustment_time;
        let cooldown = self.config.adjustment_cooldown();
        if !guards::cooldown_elapsed(last, now, cooldown) {
            trace!(strategy_id = %self.id, "adjustment cooldown active");
            self.publish(
                DecisionKind::AdjustmentSkipped,
                "adjustment skipped: cooldown active",
                json!({
                    "guard": "cooldown",
                    "cooldown_secs": cooldown.as_secs(),
                    "last_adjustment": last,
                }),
            );
            return Evaluation::CoolingDown;
        }

        match self.policy.adjust(self, snapshot).await {
            Ok(()) => Evaluation::Adjusted,
            Err(e) => {
                warn!(strategy_id = %self.id, error = %e, "adjustment failed");
                self.publish(
                    DecisionKind::AdjustmentFailed,
                    format!("adjustment failed: {e}"),
                    json!({ "error": e.to_string() }),
                );
                Evaluation::AdjustFailed
            }
        }
    }

    fn auto_pause(&self, trigger: AutoPauseTrigger) {
        let paused = {
            let mut state = self.state.write();
            if state.status == StrategyStatus::Active {
                state.status = StrategyStatus::Paused;
                true
            } else {
                false
            }
        };

        if paused {
            warn!(strategy_id = %self.id, ?trigger, "auto-paused");
            self.publish(
                DecisionKind::AutoPaused,
                "protective threshold breached",
                serde_json::to_value(trigger).unwrap_or(Value::Null),
            );
        }
    }

    // =========================================================================
    // Positions
    // =========================================================================

    /// Adds a position unless one with the same id is held or its quantity
    /// is zero. Sets the entry premium while none is set; it stays unset
    /// until a held position carries an average price.
    pub fn add_position(&self, position: Position) -> bool {
        if position.quantity == 0 {
            warn!(strategy_id = %self.id, position_id = %position.id, "zero-quantity position ignored");
            return false;
        }
        let mut state = self.state.write();
        if state.positions.iter().any(|p| p.id == position.id) {
            warn!(strategy_id = %self.id, position_id = %position.id, "duplicate position ignored");
            return false;
        }
        state.positions.push(position);
        if state.entry_premium.is_none() {
            state.entry_premium = weighted_entry_premium(&state.positions);
        }
        true
    }

    /// Replaces a position by id. A zero quantity removes it.
    pub fn update_position(&self, position: Position) -> bool {
        if position.quantity == 0 {
            return self.remove_position(&position.id).is_some();
        }
        let mut state = self.state.write();
        match state.positions.iter_mut().find(|p| p.id == position.id) {
            Some(slot) => {
                *slot = position;
                true
            }
            None => false,
        }
    }

    pub fn remove_position(&self, position_id: &str) -> Option<Position> {
        let mut state = self.state.write();
        let index = state.positions.iter().position(|p| p.id == position_id)?;
        let removed = state.positions.remove(index);
        if state.positions.is_empty() {
            state.entry_premium = None;
        }
        Some(removed)
    }

    /// Copy of the current positions.
    #[must_use]
    pub fn get_positions(&self) -> Vec<Position> {
        self.state.read().positions.clone()
    }
}

/// Orders that flatten every position, priced at the last traded price.
fn exit_orders(positions: &[Position]) -> Vec<OrderRequest> {
    positions
        .iter()
        .filter(|p| p.quantity != 0)
        .map(|p| {
            let order = OrderRequest::market(
                p.trading_symbol.clone(),
                p.instrument_token,
                OrderSide::closing(p.quantity),
                p.quantity.abs(),
            )
            .with_tag("EXIT");
            match p.last_price.or(p.average_price) {
                Some(price) => order.with_price(price),
                None => order,
            }
        })
        .collect()
}
