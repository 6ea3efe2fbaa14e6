//! Shared value types, strategy configuration, decision events and
//! application configuration for the options strategy desk.

pub mod clock;
pub mod config;
pub mod config_loader;
pub mod events;
pub mod instrument;
pub mod position;
pub mod strategy_config;
pub mod symbol;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, EngineConfig, JournalConfig, LoggingConfig, PaperConfig};
pub use config_loader::ConfigLoader;
pub use events::{
    BroadcastDecisionSink, CompositeDecisionSink, DecisionDetails, DecisionEvent, DecisionKind,
    DecisionSink, LoggingDecisionSink, RecordingDecisionSink,
};
pub use instrument::StaticInstrumentResolver;
pub use position::{weighted_entry_premium, Fill, Position, PositionBook};
pub use strategy_config::{
    CalendarSpreadParams, ConfigError, CustomParams, DeltaNeutralParams, IronButterflyParams,
    IronCondorParams, PolicyConfig, PositionSide, ScalpingParams, StraddleParams,
    StrangleParams, StrategyConfig, StrategyType, VerticalSpreadParams,
};
pub use symbol::OptionSymbol;
pub use traits::{InstrumentResolver, PositionSource};
pub use types::{Greeks, Instrument, MarketSnapshot, OptionType, OrderRequest, OrderSide, OrderType};
