//! Intent and result records for multi-leg execution.

use chrono::{DateTime, Utc};
use optdesk_core::{OrderRequest, OrderSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle phase a batch of legs belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionPhase {
    Entry,
    Exit,
    Adjustment,
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => f.write_str("ENTRY"),
            Self::Exit => f.write_str("EXIT"),
            Self::Adjustment => f.write_str("ADJUSTMENT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Everything needed to reconcile a batch after a restart. Written to the
/// journal before the first leg is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionIntent {
    pub group_id: Uuid,
    pub strategy_id: String,
    pub phase: ExecutionPhase,
    pub priority: ExecutionPriority,
    pub legs: Vec<OrderRequest>,
    pub created_at: DateTime<Utc>,
}

impl ExecutionIntent {
    #[must_use]
    pub fn new(
        strategy_id: impl Into<String>,
        phase: ExecutionPhase,
        priority: ExecutionPriority,
        legs: Vec<OrderRequest>,
    ) -> Self {
        Self {
            group_id: Uuid::new_v4(),
            strategy_id: strategy_id.into(),
            phase,
            priority,
            legs,
            created_at: Utc::now(),
        }
    }
}

/// Terminal outcome of a single leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegStatus {
    Filled,
    /// Broker refused the order.
    Rejected,
    /// Transport or API failure; the order may or may not have reached the broker.
    Failed,
    /// Never submitted because an earlier stage of the batch failed.
    Skipped,
    /// No outcome before the batch deadline. Needs reconciliation.
    TimedOut,
}

impl LegStatus {
    /// Whether the broker might hold a live or filled order for this leg.
    #[must_use]
    pub const fn may_have_reached_broker(self) -> bool {
        matches!(self, Self::Filled | Self::Failed | Self::TimedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegResult {
    /// Index of the leg in the submitted batch.
    pub leg_index: usize,
    pub trading_symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub status: LegStatus,
    pub broker_order_id: Option<String>,
    pub fill_price: Option<Decimal>,
    pub message: Option<String>,
}

impl LegResult {
    #[must_use]
    pub fn filled(
        leg_index: usize,
        order: &OrderRequest,
        broker_order_id: String,
        fill_price: Decimal,
    ) -> Self {
        Self {
            broker_order_id: Some(broker_order_id),
            fill_price: Some(fill_price),
            ..Self::with_status(leg_index, order, LegStatus::Filled, None)
        }
    }

    #[must_use]
    pub fn with_status(
        leg_index: usize,
        order: &OrderRequest,
        status: LegStatus,
        message: Option<String>,
    ) -> Self {
        Self {
            leg_index,
            trading_symbol: order.trading_symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            status,
            broker_order_id: None,
            fill_price: None,
            message,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == LegStatus::Filled
    }
}

/// Single pass/fail outcome of a batch plus per-leg detail.
///
/// `success` is true only when every leg filled. A failed group may still
/// contain filled legs; reconciling those is the journal's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiLegResult {
    pub group_id: Uuid,
    pub success: bool,
    pub leg_results: Vec<LegResult>,
}

impl MultiLegResult {
    /// Builds a result from per-leg outcomes, sorted by leg index.
    #[must_use]
    pub fn from_legs(group_id: Uuid, mut leg_results: Vec<LegResult>) -> Self {
        leg_results.sort_by_key(|leg| leg.leg_index);
        let success = leg_results.iter().all(LegResult::is_success);
        Self {
            group_id,
            success,
            leg_results,
        }
    }

    /// A failed result in which no leg was sent.
    #[must_use]
    pub fn not_submitted(group_id: Uuid, orders: &[OrderRequest], reason: &str) -> Self {
        let legs = orders
            .iter()
            .enumerate()
            .map(|(i, order)| {
                LegResult::with_status(i, order, LegStatus::Skipped, Some(reason.to_string()))
            })
            .collect();
        Self {
            group_id,
            success: false,
            leg_results: legs,
        }
    }

    #[must_use]
    pub fn filled_legs(&self) -> Vec<&LegResult> {
        self.leg_results.iter().filter(|l| l.is_success()).collect()
    }

    #[must_use]
    pub fn failed_legs(&self) -> Vec<&LegResult> {
        self.leg_results.iter().filter(|l| !l.is_success()).collect()
    }

    /// True when some legs filled and others did not.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.success && self.leg_results.iter().any(LegResult::is_success)
    }
}
