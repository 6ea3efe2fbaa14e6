//! Broker order placement seam and a paper implementation.

use async_trait::async_trait;
use chrono::Utc;
use optdesk_core::{Fill, OrderRequest, OrderSide, PaperConfig, PositionBook};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::types::LegStatus;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("order rejected: {reason}")]
    Rejected { reason: String },

    #[error("insufficient margin")]
    InsufficientMargin,

    #[error("broker did not respond in time")]
    Timeout,

    #[error("broker api error: {0}")]
    Api(String),
}

impl BrokerError {
    /// Leg status recorded for an order that failed with this error.
    #[must_use]
    pub const fn leg_status(&self) -> LegStatus {
        match self {
            Self::Rejected { .. } | Self::InsufficientMargin => LegStatus::Rejected,
            Self::Timeout | Self::Api(_) => LegStatus::Failed,
        }
    }
}

/// Broker acknowledgement of a filled order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub broker_order_id: String,
    pub average_price: Decimal,
    pub filled_quantity: i64,
}

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Places one order and waits for its terminal state.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError>;
}

// =============================================================================
// Paper broker
// =============================================================================

/// Fills every order locally at its reference price plus slippage.
///
/// Makes no network calls. Orders without a reference price are rejected,
/// as are orders for symbols in the reject list.
#[derive(Debug)]
pub struct PaperBroker {
    slippage_bps: Decimal,
    reject_symbols: HashSet<String>,
    latency: Duration,
    next_order_id: AtomicU64,
    book: Option<Arc<PositionBook>>,
    submitted: Mutex<Vec<OrderRequest>>,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new(Decimal::ZERO)
    }
}

impl PaperBroker {
    #[must_use]
    pub fn new(slippage_bps: Decimal) -> Self {
        Self {
            slippage_bps,
            reject_symbols: HashSet::new(),
            latency: Duration::ZERO,
            next_order_id: AtomicU64::new(1),
            book: None,
            submitted: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn from_config(config: &PaperConfig) -> Self {
        Self::new(Decimal::from(config.slippage_bps))
            .with_reject_symbols(config.reject_symbols.iter().cloned())
            .with_latency(Duration::from_millis(config.latency_ms))
    }

    #[must_use]
    pub fn with_reject_symbols(mut self, symbols: impl IntoIterator<Item = String>) -> Self {
        self.reject_symbols.extend(symbols);
        self
    }

    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Applies every fill to the given book.
    #[must_use]
    pub fn with_position_book(mut self, book: Arc<PositionBook>) -> Self {
        self.book = Some(book);
        self
    }

    /// Orders in the sequence they reached the broker, filled or not.
    #[must_use]
    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.submitted.lock().clone()
    }

    fn fill_price(&self, side: OrderSide, reference: Decimal) -> Decimal {
        let slip = reference * self.slippage_bps / Decimal::from(10_000);
        match side {
            OrderSide::Buy => reference + slip,
            OrderSide::Sell => (reference - slip).max(Decimal::ZERO),
        }
    }
}

#[async_trait]
impl BrokerClient for PaperBroker {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        self.submitted.lock().push(order.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.reject_symbols.contains(&order.trading_symbol) {
            return Err(BrokerError::Rejected {
                reason: format!("{} is blocked", order.trading_symbol),
            });
        }
        if order.quantity <= 0 {
            return Err(BrokerError::Rejected {
                reason: format!("invalid quantity {}", order.quantity),
            });
        }
        let Some(reference) = order.price else {
            return Err(BrokerError::Rejected {
                reason: "no reference price".to_string(),
            });
        };

        let price = self.fill_price(order.side, reference);
        let order_id = self.next_order_id.fetch_add(1, Ordering::Relaxed);

        if let Some(book) = &self.book {
            book.apply_fill(&Fill {
                trading_symbol: order.trading_symbol.clone(),
                instrument_token: order.instrument_token,
                side: order.side,
                quantity: order.quantity,
                price,
                timestamp: Utc::now(),
            });
        }

        tracing::debug!(
            symbol = %order.trading_symbol,
            side = %order.side,
            quantity = order.quantity,
            %price,
            "paper fill"
        );

        Ok(OrderAck {
            broker_order_id: format!("PAPER-{order_id}"),
            average_price: price,
            filled_quantity: order.quantity,
        })
    }
}
