//! Scripted policy for unit tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use optdesk_core::{MarketSnapshot, OrderRequest, OrderSide, StrategyType};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::StrategyEngine;
use crate::policy::StrategyPolicy;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 22, 9, 30, 0).unwrap()
}

/// Answers and call counters shared between a test and its policy.
#[derive(Debug, Default)]
pub struct Script {
    pub enter: AtomicBool,
    pub exit: AtomicBool,
    /// Build entry orders without a price so the paper broker rejects them.
    pub unpriced_orders: AtomicBool,
    /// Make `adjust` return an error.
    pub fail_adjust: AtomicBool,
    pub should_enter_calls: AtomicUsize,
    pub build_calls: AtomicUsize,
    pub should_exit_calls: AtomicUsize,
    pub adjust_calls: AtomicUsize,
}

impl Script {
    pub fn total_calls(&self) -> usize {
        self.should_enter_calls.load(Ordering::SeqCst)
            + self.build_calls.load(Ordering::SeqCst)
            + self.should_exit_calls.load(Ordering::SeqCst)
            + self.adjust_calls.load(Ordering::SeqCst)
    }
}

pub struct ScriptedPolicy {
    script: Arc<Script>,
    interval: Duration,
}

impl ScriptedPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            script: Arc::new(Script::default()),
            interval,
        }
    }

    pub fn script(&self) -> Arc<Script> {
        self.script.clone()
    }
}

#[async_trait]
impl StrategyPolicy for ScriptedPolicy {
    fn strategy_type(&self) -> StrategyType {
        StrategyType::Straddle
    }

    fn monitoring_interval(&self) -> Duration {
        self.interval
    }

    fn should_enter(&self, _engine: &StrategyEngine, _snapshot: &MarketSnapshot) -> bool {
        self.script.should_enter_calls.fetch_add(1, Ordering::SeqCst);
        self.script.enter.load(Ordering::SeqCst)
    }

    fn build_entry_orders(
        &self,
        _engine: &StrategyEngine,
        _snapshot: &MarketSnapshot,
    ) -> Vec<OrderRequest> {
        self.script.build_calls.fetch_add(1, Ordering::SeqCst);
        let unpriced = self.script.unpriced_orders.load(Ordering::SeqCst);
        ["NIFTY24JAN22000CE", "NIFTY24JAN22000PE"]
            .iter()
            .enumerate()
            .map(|(i, symbol)| {
                let order = OrderRequest::market(*symbol, i as u64 + 1, OrderSide::Sell, 50);
                if unpriced {
                    order
                } else {
                    order.with_price(dec!(100))
                }
            })
            .collect()
    }

    fn should_exit(&self, _engine: &StrategyEngine, _snapshot: &MarketSnapshot) -> bool {
        self.script.should_exit_calls.fetch_add(1, Ordering::SeqCst);
        self.script.exit.load(Ordering::SeqCst)
    }

    async fn adjust(&self, _engine: &StrategyEngine, _snapshot: &MarketSnapshot) -> Result<()> {
        self.script.adjust_calls.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_adjust.load(Ordering::SeqCst) {
            anyhow::bail!("scripted adjustment failure");
        }
        Ok(())
    }

    fn supported_morphs(&self) -> Vec<StrategyType> {
        vec![StrategyType::Strangle]
    }
}
