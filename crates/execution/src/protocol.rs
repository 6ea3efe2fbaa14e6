//! Multi-leg order submission.
//!
//! Entry legs go out concurrently. Exit legs go out in two stages: every buy
//! (covering a short) first, then the sells once all buys have filled.
//! Covering first releases the margin the sells may need.

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use optdesk_core::{OrderRequest, OrderSide};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::broker::BrokerClient;
use crate::journal::{ExecutionJournal, JournalRecord};
use crate::types::{
    ExecutionIntent, ExecutionPhase, ExecutionPriority, LegResult, LegStatus, MultiLegResult,
};

/// Submits batches of legs as one intent.
///
/// Broker failures never surface as errors; they come back as a
/// [`MultiLegResult`] with `success == false`.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn execute_parallel(
        &self,
        orders: Vec<OrderRequest>,
        strategy_id: &str,
        phase: ExecutionPhase,
        priority: ExecutionPriority,
    ) -> MultiLegResult;

    /// Buys first, sells after every buy filled. `timeout` bounds the whole
    /// sequence; legs without an outcome by then are reported `TimedOut`.
    async fn execute_buy_first_then_sell(
        &self,
        orders: Vec<OrderRequest>,
        strategy_id: &str,
        phase: ExecutionPhase,
        priority: ExecutionPriority,
        timeout: Duration,
    ) -> MultiLegResult;
}

/// Journaled executor over a [`BrokerClient`].
pub struct MultiLegExecutor {
    broker: Arc<dyn BrokerClient>,
    journal: Arc<dyn ExecutionJournal>,
}

impl MultiLegExecutor {
    #[must_use]
    pub fn new(broker: Arc<dyn BrokerClient>, journal: Arc<dyn ExecutionJournal>) -> Self {
        Self { broker, journal }
    }

    /// Journals the intent. On failure nothing may be sent.
    fn begin(
        &self,
        orders: Vec<OrderRequest>,
        strategy_id: &str,
        phase: ExecutionPhase,
        priority: ExecutionPriority,
    ) -> Result<ExecutionIntent, MultiLegResult> {
        let intent = ExecutionIntent::new(strategy_id, phase, priority, orders);
        if let Err(e) = self.journal.append(&JournalRecord::Intent(intent.clone())) {
            error!(
                group_id = %intent.group_id,
                strategy_id,
                error = %e,
                "failed to journal execution intent, nothing submitted"
            );
            return Err(MultiLegResult::not_submitted(
                intent.group_id,
                &intent.legs,
                "intent could not be journaled",
            ));
        }
        info!(
            group_id = %intent.group_id,
            strategy_id,
            %phase,
            legs = intent.legs.len(),
            "submitting multi-leg group"
        );
        Ok(intent)
    }

    fn record(&self, group_id: Uuid, result: &LegResult) {
        let record = JournalRecord::LegOutcome {
            group_id,
            result: result.clone(),
            at: Utc::now(),
        };
        if let Err(e) = self.journal.append(&record) {
            error!(%group_id, leg = result.leg_index, error = %e, "failed to journal leg outcome");
        }
    }

    async fn submit_leg(&self, group_id: Uuid, leg_index: usize, order: &OrderRequest) -> LegResult {
        let result = match self.broker.place_order(order).await {
            Ok(ack) => LegResult::filled(leg_index, order, ack.broker_order_id, ack.average_price),
            Err(e) => {
                warn!(
                    %group_id,
                    leg = leg_index,
                    symbol = %order.trading_symbol,
                    error = %e,
                    "leg failed"
                );
                LegResult::with_status(leg_index, order, e.leg_status(), Some(e.to_string()))
            }
        };
        self.record(group_id, &result);
        result
    }

    fn finish(&self, intent: &ExecutionIntent, legs: Vec<LegResult>) -> MultiLegResult {
        let result = MultiLegResult::from_legs(intent.group_id, legs);
        let record = JournalRecord::Completed {
            group_id: intent.group_id,
            success: result.success,
            at: Utc::now(),
        };
        if let Err(e) = self.journal.append(&record) {
            error!(group_id = %intent.group_id, error = %e, "failed to journal group completion");
        }
        info!(
            group_id = %intent.group_id,
            success = result.success,
            filled = result.filled_legs().len(),
            total = result.leg_results.len(),
            "multi-leg group finished"
        );
        result
    }

    async fn run_sequenced(&self, intent: &ExecutionIntent, slots: &Mutex<Vec<Option<LegResult>>>) {
        let (buys, sells): (Vec<_>, Vec<_>) = intent
            .legs
            .iter()
            .enumerate()
            .partition(|(_, order)| order.side == OrderSide::Buy);

        join_all(buys.iter().map(|(i, order)| async move {
            let result = self.submit_leg(intent.group_id, *i, order).await;
            slots.lock()[*i] = Some(result);
        }))
        .await;

        let buys_filled = buys
            .iter()
            .all(|(i, _)| slots.lock()[*i].as_ref().is_some_and(LegResult::is_success));

        if !buys_filled {
            warn!(group_id = %intent.group_id, "buy leg failed, skipping sells");
            for (i, order) in &sells {
                let skipped = LegResult::with_status(
                    *i,
                    order,
                    LegStatus::Skipped,
                    Some("buy leg failed".to_string()),
                );
                self.record(intent.group_id, &skipped);
                slots.lock()[*i] = Some(skipped);
            }
            return;
        }

        join_all(sells.iter().map(|(i, order)| async move {
            let result = self.submit_leg(intent.group_id, *i, order).await;
            slots.lock()[*i] = Some(result);
        }))
        .await;
    }
}

#[async_trait]
impl OrderExecutor for MultiLegExecutor {
    async fn execute_parallel(
        &self,
        orders: Vec<OrderRequest>,
        strategy_id: &str,
        phase: ExecutionPhase,
        priority: ExecutionPriority,
    ) -> MultiLegResult {
        if orders.is_empty() {
            return MultiLegResult::from_legs(Uuid::new_v4(), Vec::new());
        }
        let intent = match self.begin(orders, strategy_id, phase, priority) {
            Ok(intent) => intent,
            Err(result) => return result,
        };

        let legs = join_all(
            intent
                .legs
                .iter()
                .enumerate()
                .map(|(i, order)| self.submit_leg(intent.group_id, i, order)),
        )
        .await;

        self.finish(&intent, legs)
    }

    async fn execute_buy_first_then_sell(
        &self,
        orders: Vec<OrderRequest>,
        strategy_id: &str,
        phase: ExecutionPhase,
        priority: ExecutionPriority,
        timeout: Duration,
    ) -> MultiLegResult {
        if orders.is_empty() {
            return MultiLegResult::from_legs(Uuid::new_v4(), Vec::new());
        }
        let intent = match self.begin(orders, strategy_id, phase, priority) {
            Ok(intent) => intent,
            Err(result) => return result,
        };

        let slots = Mutex::new(vec![None; intent.legs.len()]);
        let timed_out = tokio::time::timeout(timeout, self.run_sequenced(&intent, &slots))
            .await
            .is_err();

        let legs: Vec<LegResult> = slots
            .into_inner()
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.unwrap_or_else(|| {
                    LegResult::with_status(
                        i,
                        &intent.legs[i],
                        LegStatus::TimedOut,
                        Some(format!("no outcome within {}s", timeout.as_secs())),
                    )
                })
            })
            .collect();

        if timed_out {
            // Left open in the journal so recovery picks it up.
            warn!(
                group_id = %intent.group_id,
                timeout_secs = timeout.as_secs(),
                "exit sequence timed out"
            );
            return MultiLegResult::from_legs(intent.group_id, legs);
        }

        self.finish(&intent, legs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerError, OrderAck, PaperBroker};
    use crate::journal::{InMemoryJournal, JournalError};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn leg(symbol: &str, side: OrderSide) -> OrderRequest {
        OrderRequest::market(symbol, 1, side, 50).with_price(dec!(100))
    }

    fn executor(broker: Arc<PaperBroker>) -> (MultiLegExecutor, Arc<InMemoryJournal>) {
        let journal = Arc::new(InMemoryJournal::new());
        (MultiLegExecutor::new(broker, journal.clone()), journal)
    }

    struct FailingJournal;

    impl ExecutionJournal for FailingJournal {
        fn append(&self, _record: &JournalRecord) -> Result<(), JournalError> {
            Err(JournalError::Io(std::io::Error::other("disk full")))
        }

        fn records(&self) -> Result<Vec<JournalRecord>, JournalError> {
            Ok(Vec::new())
        }
    }

    /// Never answers.
    struct HangingBroker;

    #[async_trait]
    impl BrokerClient for HangingBroker {
        async fn place_order(&self, _order: &OrderRequest) -> Result<OrderAck, BrokerError> {
            std::future::pending().await
        }
    }

    // ==== Parallel Tests ====

    #[tokio::test]
    async fn test_parallel_all_legs_fill() {
        let (executor, journal) = executor(Arc::new(PaperBroker::default()));
        let result = executor
            .execute_parallel(
                vec![leg("A", OrderSide::Sell), leg("B", OrderSide::Sell)],
                "s-1",
                ExecutionPhase::Entry,
                ExecutionPriority::Normal,
            )
            .await;

        assert!(result.success);
        assert_eq!(result.leg_results.len(), 2);
        assert!(journal.incomplete_groups().unwrap().is_empty());
        // intent + 2 outcomes + completion
        assert_eq!(journal.len(), 4);
    }

    #[tokio::test]
    async fn test_parallel_single_rejection_fails_group() {
        let broker = Arc::new(PaperBroker::default().with_reject_symbols(["B".to_string()]));
        let (executor, journal) = executor(broker);
        let result = executor
            .execute_parallel(
                vec![leg("A", OrderSide::Sell), leg("B", OrderSide::Sell)],
                "s-1",
                ExecutionPhase::Entry,
                ExecutionPriority::Normal,
            )
            .await;

        assert!(!result.success);
        assert!(result.is_partial());
        assert_eq!(result.leg_results[1].status, LegStatus::Rejected);

        let groups = journal.groups().unwrap();
        assert_eq!(groups[0].completed, Some(false));
    }

    #[tokio::test]
    async fn test_empty_batch_succeeds_without_journaling() {
        let (executor, journal) = executor(Arc::new(PaperBroker::default()));
        let result = executor
            .execute_parallel(Vec::new(), "s-1", ExecutionPhase::Entry, ExecutionPriority::Normal)
            .await;

        assert!(result.success);
        assert!(journal.is_empty());
    }

    #[tokio::test]
    async fn test_unjournaled_intent_submits_nothing() {
        let broker = Arc::new(PaperBroker::default());
        let executor = MultiLegExecutor::new(broker.clone(), Arc::new(FailingJournal));
        let result = executor
            .execute_parallel(
                vec![leg("A", OrderSide::Sell)],
                "s-1",
                ExecutionPhase::Entry,
                ExecutionPriority::High,
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.leg_results[0].status, LegStatus::Skipped);
        assert!(broker.submitted().is_empty());
    }

    // ==== Sequenced Exit Tests ====

    #[tokio::test]
    async fn test_buys_submitted_before_sells() {
        let broker = Arc::new(PaperBroker::default());
        let (executor, _journal) = executor(broker.clone());
        let result = executor
            .execute_buy_first_then_sell(
                vec![
                    leg("LONG", OrderSide::Sell),
                    leg("SHORT1", OrderSide::Buy),
                    leg("SHORT2", OrderSide::Buy),
                ],
                "s-1",
                ExecutionPhase::Exit,
                ExecutionPriority::High,
                Duration::from_secs(5),
            )
            .await;

        assert!(result.success);
        let sides: Vec<OrderSide> = broker.submitted().iter().map(|o| o.side).collect();
        assert_eq!(sides, vec![OrderSide::Buy, OrderSide::Buy, OrderSide::Sell]);
        // Results stay in submission-batch order.
        assert_eq!(result.leg_results[0].trading_symbol, "LONG");
    }

    #[tokio::test]
    async fn test_failed_buy_skips_sells() {
        let broker = Arc::new(PaperBroker::default().with_reject_symbols(["SHORT".to_string()]));
        let (executor, journal) = executor(broker.clone());
        let result = executor
            .execute_buy_first_then_sell(
                vec![leg("SHORT", OrderSide::Buy), leg("LONG", OrderSide::Sell)],
                "s-1",
                ExecutionPhase::Exit,
                ExecutionPriority::High,
                Duration::from_secs(5),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.leg_results[0].status, LegStatus::Rejected);
        assert_eq!(result.leg_results[1].status, LegStatus::Skipped);
        assert_eq!(broker.submitted().len(), 1);
        assert!(journal.incomplete_groups().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_missing_legs_and_leaves_group_open() {
        let journal = Arc::new(InMemoryJournal::new());
        let executor = MultiLegExecutor::new(Arc::new(HangingBroker), journal.clone());

        let result = executor
            .execute_buy_first_then_sell(
                vec![leg("SHORT", OrderSide::Buy), leg("LONG", OrderSide::Sell)],
                "s-1",
                ExecutionPhase::Exit,
                ExecutionPriority::Critical,
                Duration::from_secs(30),
            )
            .await;

        assert!(!result.success);
        assert!(result
            .leg_results
            .iter()
            .all(|l| l.status == LegStatus::TimedOut));

        let open = journal.incomplete_groups().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].unresolved_legs(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_fill_price_reported_per_leg() {
        let (executor, _journal) = executor(Arc::new(PaperBroker::new(Decimal::ZERO)));
        let result = executor
            .execute_parallel(
                vec![leg("A", OrderSide::Sell)],
                "s-1",
                ExecutionPhase::Adjustment,
                ExecutionPriority::Low,
            )
            .await;

        assert_eq!(result.leg_results[0].fill_price, Some(dec!(100)));
        assert_eq!(result.leg_results[0].broker_order_id.as_deref(), Some("PAPER-1"));
    }
}
