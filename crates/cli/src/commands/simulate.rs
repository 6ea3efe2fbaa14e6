//! Simulate CLI command.
//!
//! Runs one straddle strategy end to end on the paper broker: synthetic
//! spot and option quotes, scheduled evaluation, adoption of fills into the
//! allocation ledger and release of flattened legs. Decision events are
//! printed as JSON lines.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Args;
use optdesk_core::{
    AppConfig, BroadcastDecisionSink, Clock, CompositeDecisionSink, DecisionEvent, Instrument,
    LoggingDecisionSink, ManualClock, MarketSnapshot, OptionType, PolicyConfig, PositionBook,
    PositionSource, StaticInstrumentResolver, StraddleParams, StrategyConfig,
};
use optdesk_execution::{ExecutionJournal, FileJournal, MultiLegExecutor, PaperBroker};
use optdesk_ledger::AllocationLedger;
use optdesk_strategy::{
    round_to_strike, SnapshotBoard, StraddlePolicy, StrategyEngine, StrategyReport,
    StrategyScheduler, StrategyStatus, TickResult,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::load_strategy_config;

/// Strikes listed on each side of the starting ATM strike.
const STRIKES_EACH_SIDE: i64 = 10;
const FIRST_INSTRUMENT_TOKEN: u64 = 1000;

/// Arguments for the simulate command.
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Straddle strategy config, inline JSON or a path to a JSON file
    #[arg(long)]
    pub strategy_config: Option<String>,

    /// Number of market ticks to simulate
    #[arg(long, default_value_t = 20)]
    pub ticks: u32,

    /// Starting spot price
    #[arg(long, default_value = "22000")]
    pub spot: Decimal,

    /// Spot move per tick, in points
    #[arg(long, default_value = "25")]
    pub step: Decimal,

    /// Market seconds between ticks (also the monitoring interval)
    #[arg(long, default_value_t = 60)]
    pub tick_secs: u64,
}

/// Runs the simulate command.
///
/// # Errors
/// Returns an error if the strategy config is invalid, is not a straddle,
/// or the journal cannot be opened.
pub async fn run_simulate(args: SimulateArgs, config: &AppConfig) -> Result<()> {
    let report = simulate(&args, config).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn simulate(args: &SimulateArgs, config: &AppConfig) -> Result<StrategyReport> {
    let strategy = match &args.strategy_config {
        Some(raw) => load_strategy_config(raw)?,
        None => default_strategy(),
    };

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let expiry = strategy
        .expiry
        .unwrap_or_else(|| clock.now().date_naive() + chrono::Duration::days(3));
    let market = SyntheticMarket::new(&strategy, args.spot, args.step, expiry);
    let resolver = Arc::new(StaticInstrumentResolver::with_instruments(
        market.instruments().to_vec(),
    ));

    let book = Arc::new(PositionBook::new());
    let broker = Arc::new(PaperBroker::from_config(&config.paper).with_position_book(book.clone()));
    let journal = Arc::new(
        FileJournal::open(&config.journal.path)
            .with_context(|| format!("opening journal {}", config.journal.path.display()))?,
    );
    let executor = Arc::new(MultiLegExecutor::new(broker, journal.clone()));

    let events = Arc::new(BroadcastDecisionSink::new(256));
    let mut decisions = events.subscribe();
    let sink = CompositeDecisionSink::new()
        .with(Arc::new(LoggingDecisionSink))
        .with(events);

    let policy = StraddlePolicy::new(resolver)
        .with_monitoring_interval(Duration::from_secs(args.tick_secs));
    let engine = Arc::new(
        StrategyEngine::new(
            format!("sim-{}", clock.now().format("%Y%m%d%H%M%S")),
            "simulated straddle",
            strategy,
            Box::new(policy),
            executor,
        )?
        .with_clock(clock.clone())
        .with_decision_sink(Arc::new(sink))
        .with_exit_timeout(config.engine.exit_timeout())
        .with_stale_data_threshold(config.engine.stale_data_threshold()),
    );

    let board = Arc::new(SnapshotBoard::new());
    let scheduler = StrategyScheduler::new(board.clone(), &config.engine);
    scheduler.register(engine.clone());
    let ledger = AllocationLedger::new().with_clock(clock.clone());

    engine.arm();
    print_decisions(&mut decisions)?;

    for tick in 0..args.ticks {
        if tick > 0 {
            clock.advance(Duration::from_secs(args.tick_secs));
        }
        let snapshot = market.snapshot(tick, clock.now());
        mark_positions(&engine, &book, &snapshot);
        board.publish(snapshot);

        for outcome in scheduler.tick_once().await {
            if let TickResult::Evaluated(evaluation) = outcome.result {
                tracing::debug!(tick, strategy_id = %outcome.strategy_id, ?evaluation, "evaluated");
            } else {
                tracing::warn!(tick, strategy_id = %outcome.strategy_id, result = ?outcome.result, "not evaluated");
            }
        }

        adopt_fills(&ledger, &engine, &*book);
        release_flattened(&ledger, &engine, &*book);
        print_decisions(&mut decisions)?;

        if engine.status() == StrategyStatus::Closing {
            tracing::info!(tick, "strategy closed, ending simulation");
            break;
        }
    }

    for over in ledger.over_allocations(&*book) {
        tracing::warn!(
            position_id = %over.position_id,
            position_quantity = over.position_quantity,
            allocated = over.allocated_quantity,
            "over-allocated position"
        );
    }
    let incomplete = journal.incomplete_groups()?;
    if !incomplete.is_empty() {
        tracing::warn!(groups = incomplete.len(), "journal has incomplete groups, run reconcile");
    }

    Ok(engine.report())
}

fn default_strategy() -> StrategyConfig {
    StrategyConfig::new("NIFTY", PolicyConfig::Straddle(StraddleParams::default()))
        .with_target_percent(Decimal::new(5, 1))
        .with_stop_loss_multiplier(Decimal::from(2))
        .with_dte_exit(0)
}

fn print_decisions(decisions: &mut broadcast::Receiver<DecisionEvent>) -> Result<()> {
    loop {
        match decisions.try_recv() {
            Ok(event) => println!("{}", serde_json::to_string(&event)?),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "decision printer lagged");
            }
            Err(_) => return Ok(()),
        }
    }
}

/// Re-prices held positions from the snapshot's quotes.
fn mark_positions(engine: &StrategyEngine, book: &PositionBook, snapshot: &MarketSnapshot) {
    for mut position in engine.get_positions() {
        let Some(price) = snapshot.quote(position.instrument_token) else {
            continue;
        };
        let average = position.average_price.unwrap_or(price);
        position.last_price = Some(price);
        position.unrealized_pnl = Some((price - average) * Decimal::from(position.quantity));
        position.last_updated = Some(snapshot.timestamp);
        book.update_quote(&position.id, price, snapshot.timestamp);
        engine.update_position(position);
    }
}

/// Adopts every unowned broker position into the strategy.
fn adopt_fills(ledger: &AllocationLedger, engine: &StrategyEngine, book: &dyn PositionSource) {
    for position in ledger.find_orphan_positions(book) {
        match ledger.adopt(engine, book, &position.id, position.quantity) {
            Ok(outcome) => tracing::info!(
                position_id = %position.id,
                quantity = position.quantity,
                warnings = outcome.warnings.len(),
                "adopted fill"
            ),
            Err(e) => tracing::warn!(position_id = %position.id, error = %e, "adoption failed"),
        }
    }
}

/// Detaches legs whose broker position has been flattened.
fn release_flattened(ledger: &AllocationLedger, engine: &StrategyEngine, book: &dyn PositionSource) {
    for leg in ledger.legs_for_strategy(engine.id()) {
        let Some(position_id) = leg.position_id.as_deref() else {
            continue;
        };
        if book.position(position_id).is_some() {
            continue;
        }
        if let Err(e) = ledger.detach(engine, position_id) {
            tracing::warn!(position_id, error = %e, "detach failed");
        }
    }
}

/// Deterministic spot path and option chain around a starting price.
struct SyntheticMarket {
    underlying: String,
    base_spot: Decimal,
    step: Decimal,
    expiry: NaiveDate,
    instruments: Vec<Instrument>,
}

impl SyntheticMarket {
    fn new(strategy: &StrategyConfig, spot: Decimal, step: Decimal, expiry: NaiveDate) -> Self {
        let interval = strategy.strike_interval;
        let atm = round_to_strike(spot, interval);
        let expiry_code = expiry.format("%y%b").to_string().to_uppercase();

        let instruments = (-STRIKES_EACH_SIDE..=STRIKES_EACH_SIDE)
            .flat_map(|k| {
                let strike = (atm + interval * Decimal::from(k)).normalize();
                [OptionType::Ce, OptionType::Pe].map(|option_type| (strike, option_type))
            })
            .zip(FIRST_INSTRUMENT_TOKEN..)
            .map(|((strike, option_type), token)| Instrument {
                instrument_token: token,
                trading_symbol: format!(
                    "{}{expiry_code}{strike}{}",
                    strategy.underlying,
                    option_type.suffix()
                ),
                underlying: strategy.underlying.clone(),
                expiry,
                strike,
                option_type,
                lot_size: strategy.lot_size,
            })
            .collect();

        Self {
            underlying: strategy.underlying.clone(),
            base_spot: spot,
            step,
            expiry,
            instruments,
        }
    }

    fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Triangle wave: three steps up, six down, three back up.
    fn spot_at(&self, tick: u32) -> Decimal {
        let phase = i64::from(tick % 12);
        let offset = match phase {
            0..=3 => phase,
            4..=9 => 6 - phase,
            _ => phase - 12,
        };
        self.base_spot + self.step * Decimal::from(offset)
    }

    /// Intrinsic value plus time value that decays each tick and with
    /// distance from spot, floored at 5.
    fn option_price(instrument: &Instrument, spot: Decimal, tick: u32) -> Decimal {
        let intrinsic = match instrument.option_type {
            OptionType::Ce => (spot - instrument.strike).max(Decimal::ZERO),
            OptionType::Pe => (instrument.strike - spot).max(Decimal::ZERO),
        };
        let decay = Decimal::from(5 * i64::from(tick));
        let distance = (spot - instrument.strike).abs() / Decimal::TEN;
        let time_value = (Decimal::from(150) - decay - distance).max(Decimal::from(5));
        intrinsic + time_value
    }

    fn snapshot(&self, tick: u32, at: chrono::DateTime<Utc>) -> MarketSnapshot {
        let spot = self.spot_at(tick);
        self.instruments.iter().fold(
            MarketSnapshot::new(&self.underlying, spot, at).with_expiry(self.expiry),
            |snapshot, instrument| {
                snapshot.with_quote(
                    instrument.instrument_token,
                    Self::option_price(instrument, spot, tick),
                )
            },
        )
    }
}
