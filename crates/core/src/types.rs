//! Plain value records shared by the engine, the execution protocol and the
//! allocation ledger.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// Options primitives
// =============================================================================

/// Call or put, identified on exchange symbols by the `CE` / `PE` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    /// Call option (`CE`).
    Ce,
    /// Put option (`PE`).
    Pe,
}

impl OptionType {
    /// Exchange symbol suffix for this option type.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Ce => "CE",
            Self::Pe => "PE",
        }
    }

    /// Parses a `CE` / `PE` suffix (case-insensitive).
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_uppercase().as_str() {
            "CE" => Some(Self::Ce),
            "PE" => Some(Self::Pe),
            _ => None,
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Option sensitivities attached to a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: Decimal,
    pub gamma: Decimal,
    pub theta: Decimal,
    pub vega: Decimal,
    pub iv: Decimal,
    /// When the greeks were calculated.
    pub calculated_at: DateTime<Utc>,
}

/// A tradable instrument as returned by instrument resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_token: u64,
    pub trading_symbol: String,
    pub underlying: String,
    pub expiry: NaiveDate,
    pub strike: Decimal,
    pub option_type: OptionType,
    pub lot_size: i64,
}

// =============================================================================
// Market snapshot
// =============================================================================

/// Point-in-time view of the market handed to every `evaluate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub underlying: String,
    pub spot_price: Decimal,
    /// Nearest expiry the strategy trades, if known.
    pub expiry: Option<NaiveDate>,
    pub vix: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    /// Last traded option prices keyed by instrument token.
    #[serde(default)]
    pub option_quotes: HashMap<u64, Decimal>,
}

impl MarketSnapshot {
    #[must_use]
    pub fn new(underlying: impl Into<String>, spot_price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            underlying: underlying.into(),
            spot_price,
            expiry: None,
            vix: None,
            timestamp,
            option_quotes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: NaiveDate) -> Self {
        self.expiry = Some(expiry);
        self
    }

    #[must_use]
    pub fn with_quote(mut self, instrument_token: u64, price: Decimal) -> Self {
        self.option_quotes.insert(instrument_token, price);
        self
    }

    #[must_use]
    pub fn quote(&self, instrument_token: u64) -> Option<Decimal> {
        self.option_quotes.get(&instrument_token).copied()
    }

    /// Calendar days from the snapshot date to expiry.
    #[must_use]
    pub fn days_to_expiry(&self) -> Option<i64> {
        self.expiry
            .map(|expiry| (expiry - self.timestamp.date_naive()).num_days())
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Side that flattens a position of the given signed quantity.
    #[must_use]
    pub const fn closing(quantity: i64) -> Self {
        if quantity < 0 {
            Self::Buy
        } else {
            Self::Sell
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("BUY"),
            Self::Sell => f.write_str("SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

/// One leg of a multi-leg order batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub trading_symbol: String,
    pub instrument_token: u64,
    pub side: OrderSide,
    /// Unsigned order quantity in units (lots × lot size).
    pub quantity: i64,
    pub order_type: OrderType,
    /// Limit price, or reference price for market orders.
    pub price: Option<Decimal>,
    pub tag: Option<String>,
}

impl OrderRequest {
    #[must_use]
    pub fn market(
        trading_symbol: impl Into<String>,
        instrument_token: u64,
        side: OrderSide,
        quantity: i64,
    ) -> Self {
        Self {
            trading_symbol: trading_symbol.into(),
            instrument_token,
            side,
            quantity,
            order_type: OrderType::Market,
            price: None,
            tag: None,
        }
    }

    #[must_use]
    pub fn limit(
        trading_symbol: impl Into<String>,
        instrument_token: u64,
        side: OrderSide,
        quantity: i64,
        price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(trading_symbol, instrument_token, side, quantity)
        }
    }

    #[must_use]
    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}
