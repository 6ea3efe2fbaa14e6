//! Strategy type tags and the polymorphic per-strategy configuration.
//!
//! `PolicyConfig` is keyed by the `"type"` discriminator so a stored
//! configuration always deserializes back into the same policy variant.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::OptionType;

// =============================================================================
// Strategy Type
// =============================================================================

/// Identifies which policy drives a strategy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyType {
    Straddle,
    Strangle,
    IronCondor,
    IronButterfly,
    BullCallSpread,
    BearCallSpread,
    BullPutSpread,
    BearPutSpread,
    CalendarSpread,
    Scalping,
    DeltaNeutral,
    Custom,
}

const CALLS_ONLY: &[OptionType] = &[OptionType::Ce];
const PUTS_ONLY: &[OptionType] = &[OptionType::Pe];
const BOTH_SIDES: &[OptionType] = &[OptionType::Ce, OptionType::Pe];

impl StrategyType {
    /// Option sides this strategy type trades. Used to flag suspicious
    /// adoptions, never to block them.
    #[must_use]
    pub const fn traded_option_types(self) -> &'static [OptionType] {
        match self {
            Self::BullCallSpread | Self::BearCallSpread => CALLS_ONLY,
            Self::BullPutSpread | Self::BearPutSpread => PUTS_ONLY,
            _ => BOTH_SIDES,
        }
    }

    #[must_use]
    pub fn trades(self, option_type: OptionType) -> bool {
        self.traded_option_types().contains(&option_type)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Straddle => "STRADDLE",
            Self::Strangle => "STRANGLE",
            Self::IronCondor => "IRON_CONDOR",
            Self::IronButterfly => "IRON_BUTTERFLY",
            Self::BullCallSpread => "BULL_CALL_SPREAD",
            Self::BearCallSpread => "BEAR_CALL_SPREAD",
            Self::BullPutSpread => "BULL_PUT_SPREAD",
            Self::BearPutSpread => "BEAR_PUT_SPREAD",
            Self::CalendarSpread => "CALENDAR_SPREAD",
            Self::Scalping => "SCALPING",
            Self::DeltaNeutral => "DELTA_NEUTRAL",
            Self::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Policy parameters
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    #[default]
    Short,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StraddleParams {
    pub side: PositionSide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrangleParams {
    pub side: PositionSide,
    /// Distance of each leg from ATM, in points.
    pub wing_distance: Decimal,
}

impl Default for StrangleParams {
    fn default() -> Self {
        Self {
            side: PositionSide::Short,
            wing_distance: Decimal::from(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IronCondorParams {
    pub short_distance: Decimal,
    pub wing_width: Decimal,
}

impl Default for IronCondorParams {
    fn default() -> Self {
        Self {
            short_distance: Decimal::from(200),
            wing_width: Decimal::from(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IronButterflyParams {
    pub wing_width: Decimal,
}

impl Default for IronButterflyParams {
    fn default() -> Self {
        Self {
            wing_width: Decimal::from(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerticalSpreadParams {
    /// Distance between the two strikes, in points.
    pub width: Decimal,
}

impl Default for VerticalSpreadParams {
    fn default() -> Self {
        Self {
            width: Decimal::from(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSpreadParams {
    pub far_expiry: NaiveDate,
    pub option_type: OptionType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalpingParams {
    pub option_type: OptionType,
    pub target_points: Decimal,
    pub stop_points: Decimal,
}

impl Default for ScalpingParams {
    fn default() -> Self {
        Self {
            option_type: OptionType::Ce,
            target_points: Decimal::from(10),
            stop_points: Decimal::from(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaNeutralParams {
    /// Net delta beyond which the policy rebalances.
    pub rebalance_delta: Decimal,
}

impl Default for DeltaNeutralParams {
    fn default() -> Self {
        Self {
            rebalance_delta: Decimal::from(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomParams {
    pub description: Option<String>,
}

/// Policy-specific configuration, tagged by strategy type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyConfig {
    Straddle(StraddleParams),
    Strangle(StrangleParams),
    IronCondor(IronCondorParams),
    IronButterfly(IronButterflyParams),
    BullCallSpread(VerticalSpreadParams),
    BearCallSpread(VerticalSpreadParams),
    BullPutSpread(VerticalSpreadParams),
    BearPutSpread(VerticalSpreadParams),
    CalendarSpread(CalendarSpreadParams),
    Scalping(ScalpingParams),
    DeltaNeutral(DeltaNeutralParams),
    Custom(CustomParams),
}

impl PolicyConfig {
    #[must_use]
    pub const fn strategy_type(&self) -> StrategyType {
        match self {
            Self::Straddle(_) => StrategyType::Straddle,
            Self::Strangle(_) => StrategyType::Strangle,
            Self::IronCondor(_) => StrategyType::IronCondor,
            Self::IronButterfly(_) => StrategyType::IronButterfly,
            Self::BullCallSpread(_) => StrategyType::BullCallSpread,
            Self::BearCallSpread(_) => StrategyType::BearCallSpread,
            Self::BullPutSpread(_) => StrategyType::BullPutSpread,
            Self::BearPutSpread(_) => StrategyType::BearPutSpread,
            Self::CalendarSpread(_) => StrategyType::CalendarSpread,
            Self::Scalping(_) => StrategyType::Scalping,
            Self::DeltaNeutral(_) => StrategyType::DeltaNeutral,
            Self::Custom(_) => StrategyType::Custom,
        }
    }
}

// =============================================================================
// Strategy configuration
// =============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("auto_pause_pnl_threshold must be negative, got {0}")]
    PnlThresholdNotNegative(Decimal),

    #[error("underlying must not be empty")]
    MissingUnderlying,
}

/// Configuration of one strategy instance. Immutable once the engine is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub underlying: String,
    #[serde(default)]
    pub expiry: Option<NaiveDate>,
    #[serde(default = "default_lots")]
    pub lots: i64,
    #[serde(default = "default_lot_size")]
    pub lot_size: i64,
    #[serde(default = "default_strike_interval")]
    pub strike_interval: Decimal,
    /// Profit target as a fraction of entry premium (0.5 = 50%).
    #[serde(default)]
    pub target_percent: Option<Decimal>,
    /// Stop loss as a multiple of entry premium.
    #[serde(default)]
    pub stop_loss_multiplier: Option<Decimal>,
    /// Exit once days-to-expiry falls to this value.
    #[serde(default)]
    pub dte_exit: Option<i64>,
    /// Pause when total P&L falls to or below this (negative) value.
    #[serde(default)]
    pub auto_pause_pnl_threshold: Option<Decimal>,
    /// Pause when |net delta| exceeds this value.
    #[serde(default)]
    pub auto_pause_delta_threshold: Option<Decimal>,
    #[serde(default = "default_adjustment_cooldown_secs")]
    pub adjustment_cooldown_secs: u64,
    pub policy: PolicyConfig,
}

const fn default_lots() -> i64 {
    1
}

const fn default_lot_size() -> i64 {
    50
}

fn default_strike_interval() -> Decimal {
    Decimal::from(50)
}

const fn default_adjustment_cooldown_secs() -> u64 {
    300 // 5 minutes
}

impl StrategyConfig {
    #[must_use]
    pub fn new(underlying: impl Into<String>, policy: PolicyConfig) -> Self {
        Self {
            underlying: underlying.into(),
            expiry: None,
            lots: default_lots(),
            lot_size: default_lot_size(),
            strike_interval: default_strike_interval(),
            target_percent: None,
            stop_loss_multiplier: None,
            dte_exit: None,
            auto_pause_pnl_threshold: None,
            auto_pause_delta_threshold: None,
            adjustment_cooldown_secs: default_adjustment_cooldown_secs(),
            policy,
        }
    }

    #[must_use]
    pub const fn strategy_type(&self) -> StrategyType {
        self.policy.strategy_type()
    }

    /// Order quantity in units for one leg.
    #[must_use]
    pub const fn quantity(&self) -> i64 {
        self.lots * self.lot_size
    }

    #[must_use]
    pub const fn adjustment_cooldown(&self) -> Duration {
        Duration::from_secs(self.adjustment_cooldown_secs)
    }

    /// Checks the invariants the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.underlying.trim().is_empty() {
            return Err(ConfigError::MissingUnderlying);
        }
        if self.lots <= 0 {
            return Err(ConfigError::NotPositive { field: "lots" });
        }
        if self.lot_size <= 0 {
            return Err(ConfigError::NotPositive { field: "lot_size" });
        }
        if self.strike_interval <= Decimal::ZERO {
            return Err(ConfigError::NotPositive {
                field: "strike_interval",
            });
        }
        if let Some(threshold) = self.auto_pause_pnl_threshold {
            if threshold >= Decimal::ZERO {
                return Err(ConfigError::PnlThresholdNotNegative(threshold));
            }
        }
        if let Some(threshold) = self.auto_pause_delta_threshold {
            if threshold <= Decimal::ZERO {
                return Err(ConfigError::NotPositive {
                    field: "auto_pause_delta_threshold",
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: NaiveDate) -> Self {
        self.expiry = Some(expiry);
        self
    }

    #[must_use]
    pub fn with_lots(mut self, lots: i64, lot_size: i64) -> Self {
        self.lots = lots;
        self.lot_size = lot_size;
        self
    }

    #[must_use]
    pub fn with_strike_interval(mut self, interval: Decimal) -> Self {
        self.strike_interval = interval;
        self
    }

    #[must_use]
    pub fn with_target_percent(mut self, target: Decimal) -> Self {
        self.target_percent = Some(target);
        self
    }

    #[must_use]
    pub fn with_stop_loss_multiplier(mut self, multiplier: Decimal) -> Self {
        self.stop_loss_multiplier = Some(multiplier);
        self
    }

    #[must_use]
    pub fn with_dte_exit(mut self, days: i64) -> Self {
        self.dte_exit = Some(days);
        self
    }

    #[must_use]
    pub fn with_auto_pause_pnl_threshold(mut self, threshold: Decimal) -> Self {
        self.auto_pause_pnl_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_auto_pause_delta_threshold(mut self, threshold: Decimal) -> Self {
        self.auto_pause_delta_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn with_adjustment_cooldown(mut self, cooldown: Duration) -> Self {
        self.adjustment_cooldown_secs = cooldown.as_secs();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn all_policies() -> Vec<PolicyConfig> {
        vec![
            PolicyConfig::Straddle(StraddleParams::default()),
            PolicyConfig::Strangle(StrangleParams::default()),
            PolicyConfig::IronCondor(IronCondorParams::default()),
            PolicyConfig::IronButterfly(IronButterflyParams::default()),
            PolicyConfig::BullCallSpread(VerticalSpreadParams::default()),
            PolicyConfig::BearCallSpread(VerticalSpreadParams::default()),
            PolicyConfig::BullPutSpread(VerticalSpreadParams::default()),
            PolicyConfig::BearPutSpread(VerticalSpreadParams::default()),
            PolicyConfig::CalendarSpread(CalendarSpreadParams {
                far_expiry: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
                option_type: OptionType::Pe,
            }),
            PolicyConfig::Scalping(ScalpingParams::default()),
            PolicyConfig::DeltaNeutral(DeltaNeutralParams::default()),
            PolicyConfig::Custom(CustomParams {
                description: Some("hand built".to_string()),
            }),
        ]
    }

    // ==================== Discriminator Tests ====================

    #[test]
    fn test_discriminator_matches_strategy_type() {
        for policy in all_policies() {
            let json = serde_json::to_value(&policy).unwrap();
            assert_eq!(json["type"], policy.strategy_type().as_str());
        }
    }

    #[test]
    fn test_config_survives_json_storage() {
        for policy in all_policies() {
            let config = StrategyConfig::new("NIFTY", policy)
                .with_target_percent(dec!(0.5))
                .with_auto_pause_pnl_threshold(dec!(-15000));
            let stored = serde_json::to_string(&config).unwrap();
            let restored: StrategyConfig = serde_json::from_str(&stored).unwrap();
            assert_eq!(restored, config);
            assert_eq!(restored.strategy_type(), config.strategy_type());
        }
    }

    #[test]
    fn test_config_survives_toml_storage() {
        let config = StrategyConfig::new(
            "BANKNIFTY",
            PolicyConfig::IronCondor(IronCondorParams::default()),
        );
        let stored = toml::to_string(&config).unwrap();
        let restored: StrategyConfig = toml::from_str(&stored).unwrap();
        assert_eq!(restored.strategy_type(), StrategyType::IronCondor);
    }

    #[test]
    fn test_minimal_policy_uses_defaults() {
        let config: StrategyConfig =
            serde_json::from_str(r#"{"underlying":"NIFTY","policy":{"type":"STRANGLE"}}"#).unwrap();
        assert_eq!(config.policy, PolicyConfig::Strangle(StrangleParams::default()));
        assert_eq!(config.quantity(), 50);
        assert_eq!(config.adjustment_cooldown(), Duration::from_secs(300));
    }

    #[test]
    fn test_unknown_discriminator_rejected() {
        let result: Result<PolicyConfig, _> = serde_json::from_str(r#"{"type":"BUTTERFLY_ON_MARS"}"#);
        assert!(result.is_err());
    }

    // ==================== Option Side Tests ====================

    #[test]
    fn test_traded_option_types() {
        assert!(StrategyType::BullCallSpread.trades(OptionType::Ce));
        assert!(!StrategyType::BullCallSpread.trades(OptionType::Pe));
        assert!(!StrategyType::BearPutSpread.trades(OptionType::Ce));
        assert!(StrategyType::Straddle.trades(OptionType::Pe));
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_validate_rejects_positive_pnl_threshold() {
        let config = StrategyConfig::new("NIFTY", PolicyConfig::Straddle(StraddleParams::default()))
            .with_auto_pause_pnl_threshold(dec!(1000));
        assert_eq!(
            config.validate(),
            Err(ConfigError::PnlThresholdNotNegative(dec!(1000)))
        );
    }

    #[test]
    fn test_validate_rejects_zero_lots() {
        let config = StrategyConfig::new("NIFTY", PolicyConfig::Straddle(StraddleParams::default()))
            .with_lots(0, 50);
        assert_eq!(config.validate(), Err(ConfigError::NotPositive { field: "lots" }));
    }
}
