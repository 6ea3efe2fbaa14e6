//! Immediate, user-triggered entry.

use chrono::NaiveDate;
use optdesk_core::{InstrumentResolver, OptionType, OrderRequest, OrderSide};
use optdesk_execution::{ExecutionPhase, ExecutionPriority, MultiLegResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::StrategyEngine;
use crate::error::EngineError;
use crate::lifecycle::StrategyStatus;

/// One leg to open, by contract coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegTemplate {
    pub option_type: OptionType,
    pub strike: Decimal,
    pub side: OrderSide,
    /// Defaults to the strategy's configured lots.
    #[serde(default)]
    pub lots: Option<i64>,
    /// Defaults to the strategy's configured expiry.
    #[serde(default)]
    pub expiry: Option<NaiveDate>,
    /// Reference or limit price.
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl LegTemplate {
    #[must_use]
    pub const fn new(option_type: OptionType, strike: Decimal, side: OrderSide) -> Self {
        Self {
            option_type,
            strike,
            side,
            lots: None,
            expiry: None,
            price: None,
        }
    }

    #[must_use]
    pub const fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    #[must_use]
    pub const fn with_lots(mut self, lots: i64) -> Self {
        self.lots = Some(lots);
        self
    }
}

impl StrategyEngine {
    /// Resolves and submits `legs` concurrently without waiting for the
    /// policy. On success the strategy becomes `ACTIVE` exactly as after an
    /// evaluated entry.
    ///
    /// # Errors
    ///
    /// Fails before submitting anything if the strategy is not armed, no legs
    /// are given, a leg has no expiry, or a contract cannot be resolved. Broker failures are
    /// reported through the returned result.
    pub async fn enter_now(
        &self,
        legs: &[LegTemplate],
        resolver: &dyn InstrumentResolver,
    ) -> Result<MultiLegResult, EngineError> {
        let status = self.status();
        if status != StrategyStatus::Armed {
            return Err(EngineError::NotArmed(status));
        }
        if legs.is_empty() {
            return Err(EngineError::NoLegs);
        }

        let orders = legs
            .iter()
            .map(|leg| self.resolve_leg(leg, resolver))
            .collect::<Result<Vec<_>, _>>()?;

        info!(strategy_id = %self.id(), legs = orders.len(), "immediate entry");

        let result = self
            .executor()
            .execute_parallel(
                orders,
                self.id(),
                ExecutionPhase::Entry,
                ExecutionPriority::High,
            )
            .await;
        self.complete_entry(&result);
        Ok(result)
    }

    fn resolve_leg(
        &self,
        leg: &LegTemplate,
        resolver: &dyn InstrumentResolver,
    ) -> Result<OrderRequest, EngineError> {
        let config = self.config();
        let expiry = leg
            .expiry
            .or(config.expiry)
            .ok_or(EngineError::MissingExpiry)?;

        let instrument = resolver
            .resolve(&config.underlying, expiry, leg.strike, leg.option_type)
            .ok_or_else(|| EngineError::InstrumentNotFound {
                underlying: config.underlying.clone(),
                expiry,
                strike: leg.strike,
                option_type: leg.option_type,
            })?;

        let quantity = leg.lots.unwrap_or(config.lots) * instrument.lot_size;
        let order = OrderRequest::market(
            instrument.trading_symbol,
            instrument.instrument_token,
            leg.side,
            quantity,
        )
        .with_tag("ENTRY");
        Ok(match leg.price {
            Some(price) => order.with_price(price),
            None => order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPolicy;
    use optdesk_core::{
        Instrument, PolicyConfig, StaticInstrumentResolver, StraddleParams, StrategyConfig,
    };
    use optdesk_execution::{InMemoryJournal, MultiLegExecutor, PaperBroker};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 25).unwrap()
    }

    fn engine(broker: Arc<PaperBroker>) -> StrategyEngine {
        let executor = Arc::new(MultiLegExecutor::new(broker, Arc::new(InMemoryJournal::new())));
        StrategyEngine::new(
            "s-1",
            "manual",
            StrategyConfig::new("NIFTY", PolicyConfig::Straddle(StraddleParams::default()))
                .with_expiry(expiry())
                .with_lots(2, 50),
            Box::new(ScriptedPolicy::new(Duration::from_secs(60))),
            executor,
        )
        .unwrap()
    }

    fn resolver() -> StaticInstrumentResolver {
        let instrument = |token, option_type: OptionType| Instrument {
            instrument_token: token,
            trading_symbol: format!("NIFTY24JAN22000{}", option_type.suffix()),
            underlying: "NIFTY".to_string(),
            expiry: expiry(),
            strike: dec!(22000),
            option_type,
            lot_size: 50,
        };
        StaticInstrumentResolver::with_instruments([
            instrument(1, OptionType::Ce),
            instrument(2, OptionType::Pe),
        ])
    }

    fn straddle() -> Vec<LegTemplate> {
        vec![
            LegTemplate::new(OptionType::Ce, dec!(22000), OrderSide::Sell).with_price(dec!(110)),
            LegTemplate::new(OptionType::Pe, dec!(22000), OrderSide::Sell).with_price(dec!(95)),
        ]
    }

    #[tokio::test]
    async fn test_enter_now_activates() {
        let broker = Arc::new(PaperBroker::default());
        let engine = engine(broker.clone());
        engine.arm();

        let result = engine.enter_now(&straddle(), &resolver()).await.unwrap();

        assert!(result.success);
        assert_eq!(engine.status(), StrategyStatus::Active);
        assert!(engine.entry_time().is_some());
        assert!(broker.submitted().iter().all(|o| o.quantity == 100));
    }

    #[tokio::test]
    async fn test_enter_now_requires_armed() {
        let engine = engine(Arc::new(PaperBroker::default()));

        let err = engine.enter_now(&straddle(), &resolver()).await.unwrap_err();

        assert_eq!(err, EngineError::NotArmed(StrategyStatus::Created));
    }

    #[tokio::test]
    async fn test_enter_now_without_legs_stays_armed() {
        let broker = Arc::new(PaperBroker::default());
        let engine = engine(broker.clone());
        engine.arm();

        let err = engine.enter_now(&[], &resolver()).await.unwrap_err();

        assert_eq!(err, EngineError::NoLegs);
        assert!(broker.submitted().is_empty());
        assert_eq!(engine.status(), StrategyStatus::Armed);
        assert!(engine.entry_time().is_none());
    }

    #[tokio::test]
    async fn test_unknown_contract_submits_nothing() {
        let broker = Arc::new(PaperBroker::default());
        let engine = engine(broker.clone());
        engine.arm();
        let legs = vec![LegTemplate::new(OptionType::Ce, dec!(23000), OrderSide::Sell)];

        let err = engine.enter_now(&legs, &resolver()).await.unwrap_err();

        assert!(matches!(err, EngineError::InstrumentNotFound { .. }));
        assert!(broker.submitted().is_empty());
        assert_eq!(engine.status(), StrategyStatus::Armed);
    }
}
