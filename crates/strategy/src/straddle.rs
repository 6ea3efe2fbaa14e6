//! ATM straddle: one call and one put at the strike nearest spot.

use anyhow::Result;
use async_trait::async_trait;
use optdesk_core::{
    InstrumentResolver, MarketSnapshot, OptionType, OrderRequest, OrderSide, PolicyConfig,
    PositionSide, StrategyType,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::engine::StrategyEngine;
use crate::policy::StrategyPolicy;

const DEFAULT_MONITORING_INTERVAL: Duration = Duration::from_secs(60);

/// Enters once when flat, exits on target, stop-loss or days-to-expiry and
/// never adjusts. Short by default; `StraddleParams.side` selects long.
pub struct StraddlePolicy {
    resolver: Arc<dyn InstrumentResolver>,
    monitoring_interval: Duration,
}

impl StraddlePolicy {
    #[must_use]
    pub fn new(resolver: Arc<dyn InstrumentResolver>) -> Self {
        Self {
            resolver,
            monitoring_interval: DEFAULT_MONITORING_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_monitoring_interval(mut self, interval: Duration) -> Self {
        self.monitoring_interval = interval;
        self
    }

    fn entry_side(engine: &StrategyEngine) -> OrderSide {
        match &engine.config().policy {
            PolicyConfig::Straddle(params) if params.side == PositionSide::Long => OrderSide::Buy,
            _ => OrderSide::Sell,
        }
    }
}

#[async_trait]
impl StrategyPolicy for StraddlePolicy {
    fn strategy_type(&self) -> StrategyType {
        StrategyType::Straddle
    }

    fn monitoring_interval(&self) -> Duration {
        self.monitoring_interval
    }

    fn should_enter(&self, engine: &StrategyEngine, snapshot: &MarketSnapshot) -> bool {
        snapshot.underlying == engine.config().underlying && engine.get_positions().is_empty()
    }

    fn build_entry_orders(
        &self,
        engine: &StrategyEngine,
        snapshot: &MarketSnapshot,
    ) -> Vec<OrderRequest> {
        let config = engine.config();
        let Some(expiry) = config.expiry.or(snapshot.expiry) else {
            warn!(strategy_id = %engine.id(), "no expiry configured or quoted");
            return Vec::new();
        };
        let strike = engine.round_to_strike(snapshot.spot_price);
        let side = Self::entry_side(engine);

        let mut orders = Vec::with_capacity(2);
        for option_type in [OptionType::Ce, OptionType::Pe] {
            let Some(instrument) =
                self.resolver
                    .resolve(&config.underlying, expiry, strike, option_type)
            else {
                debug!(
                    strategy_id = %engine.id(),
                    %strike,
                    option_type = option_type.suffix(),
                    "contract not listed"
                );
                return Vec::new();
            };
            let order = OrderRequest::market(
                instrument.trading_symbol,
                instrument.instrument_token,
                side,
                config.quantity(),
            )
            .with_tag("ENTRY");
            orders.push(match snapshot.quote(instrument.instrument_token) {
                Some(price) => order.with_price(price),
                None => order,
            });
        }
        orders
    }

    fn should_exit(&self, engine: &StrategyEngine, snapshot: &MarketSnapshot) -> bool {
        engine.is_target_reached() || engine.is_stop_loss_hit() || engine.should_exit_for_dte(snapshot)
    }

    async fn adjust(&self, _engine: &StrategyEngine, _snapshot: &MarketSnapshot) -> Result<()> {
        Ok(())
    }

    fn supported_morphs(&self) -> Vec<StrategyType> {
        vec![StrategyType::Strangle, StrategyType::IronButterfly]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::t0;
    use chrono::NaiveDate;
    use optdesk_core::{
        Instrument, Position, StaticInstrumentResolver, StraddleParams, StrategyConfig,
    };
    use optdesk_execution::{InMemoryJournal, MultiLegExecutor, PaperBroker};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 25).unwrap()
    }

    fn resolver() -> Arc<StaticInstrumentResolver> {
        let instrument = |token, strike: Decimal, option_type: OptionType| Instrument {
            instrument_token: token,
            trading_symbol: format!("NIFTY24JAN{strike}{}", option_type.suffix()),
            underlying: "NIFTY".to_string(),
            expiry: expiry(),
            strike,
            option_type,
            lot_size: 50,
        };
        Arc::new(StaticInstrumentResolver::with_instruments([
            instrument(11, dec!(22000), OptionType::Ce),
            instrument(12, dec!(22000), OptionType::Pe),
            instrument(21, dec!(22050), OptionType::Ce),
            instrument(22, dec!(22050), OptionType::Pe),
        ]))
    }

    fn engine(params: StraddleParams) -> StrategyEngine {
        let executor = Arc::new(MultiLegExecutor::new(
            Arc::new(PaperBroker::default()),
            Arc::new(InMemoryJournal::new()),
        ));
        StrategyEngine::new(
            "s-1",
            "straddle",
            StrategyConfig::new("NIFTY", PolicyConfig::Straddle(params))
                .with_expiry(expiry())
                .with_lots(2, 50)
                .with_target_percent(dec!(0.5)),
            Box::new(StraddlePolicy::new(resolver())),
            executor,
        )
        .unwrap()
    }

    fn policy() -> StraddlePolicy {
        StraddlePolicy::new(resolver())
    }

    // ==== Entry Tests ====

    #[test]
    fn test_enters_only_when_flat() {
        let engine = engine(StraddleParams::default());
        let snapshot = MarketSnapshot::new("NIFTY", dec!(22010), t0());

        assert!(policy().should_enter(&engine, &snapshot));
        assert!(!policy().should_enter(&engine, &MarketSnapshot::new("BANKNIFTY", dec!(46000), t0())));

        engine.add_position(Position::new("p", "NIFTY24JAN22000CE", 11, -100, Some(dec!(100))));
        assert!(!policy().should_enter(&engine, &snapshot));
    }

    #[test]
    fn test_builds_atm_short_legs_with_quotes() {
        let engine = engine(StraddleParams::default());
        let snapshot = MarketSnapshot::new("NIFTY", dec!(22030), t0())
            .with_quote(21, dec!(120))
            .with_quote(22, dec!(105));

        let orders = policy().build_entry_orders(&engine, &snapshot);

        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].trading_symbol, "NIFTY24JAN22050CE");
        assert_eq!(orders[1].trading_symbol, "NIFTY24JAN22050PE");
        assert!(orders.iter().all(|o| o.side == OrderSide::Sell && o.quantity == 100));
        assert_eq!(orders[0].price, Some(dec!(120)));
        assert_eq!(orders[1].price, Some(dec!(105)));
    }

    #[test]
    fn test_long_side_buys() {
        let engine = engine(StraddleParams {
            side: PositionSide::Long,
        });
        let snapshot = MarketSnapshot::new("NIFTY", dec!(22000), t0());

        let orders = policy().build_entry_orders(&engine, &snapshot);

        assert!(orders.iter().all(|o| o.side == OrderSide::Buy));
        assert!(orders.iter().all(|o| o.price.is_none()));
    }

    #[test]
    fn test_unlisted_strike_builds_nothing() {
        let engine = engine(StraddleParams::default());
        let snapshot = MarketSnapshot::new("NIFTY", dec!(23000), t0());

        assert!(policy().build_entry_orders(&engine, &snapshot).is_empty());
    }

    // ==== Exit Tests ====

    #[test]
    fn test_exits_on_target() {
        let engine = engine(StraddleParams::default());
        let snapshot = MarketSnapshot::new("NIFTY", dec!(22000), t0());
        engine.add_position(
            Position::new("p", "NIFTY24JAN22000CE", 11, -100, Some(dec!(100)))
                .with_unrealized_pnl(dec!(20)),
        );
        assert!(!policy().should_exit(&engine, &snapshot));

        engine.update_position(
            Position::new("p", "NIFTY24JAN22000CE", 11, -100, Some(dec!(100)))
                .with_unrealized_pnl(dec!(50)),
        );
        assert!(policy().should_exit(&engine, &snapshot));
    }

    #[test]
    fn test_morphs() {
        let engine = engine(StraddleParams::default());
        assert!(engine.can_morph_to(StrategyType::IronButterfly));
        assert!(!engine.can_morph_to(StrategyType::IronCondor));
    }
}
