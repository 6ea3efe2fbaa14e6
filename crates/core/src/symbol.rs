//! Exchange option symbol parsing.
//!
//! Index option symbols follow `<UNDERLYING><EXPIRY><STRIKE><CE|PE>` where the
//! expiry code is always five characters: `YYMMM` for monthly contracts
//! (`NIFTY24JAN22000CE`) or `YYMDD` for weekly ones (`NIFTY2412522000PE`).

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::types::OptionType;

const EXPIRY_CODE_LEN: usize = 5;

/// Components recovered from an option trading symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSymbol {
    pub underlying: String,
    pub strike: Option<Decimal>,
    pub option_type: OptionType,
}

impl OptionSymbol {
    /// Parses a trading symbol. Returns `None` for anything without a
    /// `CE` / `PE` suffix (futures, equities).
    #[must_use]
    pub fn parse(trading_symbol: &str) -> Option<Self> {
        let symbol = trading_symbol.trim();
        if symbol.len() < 3 || !symbol.is_ascii() {
            return None;
        }

        let (body, suffix) = symbol.split_at(symbol.len() - 2);
        let option_type = OptionType::from_suffix(suffix)?;

        let underlying_len = body
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(body.len());
        let underlying = body[..underlying_len].to_ascii_uppercase();
        if underlying.is_empty() {
            return None;
        }

        let rest = &body[underlying_len..];
        if rest.is_empty() {
            return None;
        }
        let strike = rest
            .get(EXPIRY_CODE_LEN..)
            .filter(|digits| !digits.is_empty())
            .and_then(|digits| Decimal::from_str(digits).ok());

        Some(Self {
            underlying,
            strike,
            option_type,
        })
    }
}

/// Option type implied by the symbol suffix, if any.
#[must_use]
pub fn option_type_of(trading_symbol: &str) -> Option<OptionType> {
    OptionSymbol::parse(trading_symbol).map(|parsed| parsed.option_type)
}
