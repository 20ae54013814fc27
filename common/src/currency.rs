//! Currency codes and currency pairs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RateError;

/// Separator between the two codes of a pair key (`BTC_USD`).
pub const PAIR_SEPARATOR: char = '_';

/// Upper-case currency or ticker code (`USD`, `BTC`, `DOGE`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parse and normalise a code.
    ///
    /// Codes are trimmed and upper-cased, and must be 2 to 5 characters with
    /// no whitespace.
    pub fn parse(code: &str) -> Result<Self, RateError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(RateError::InvalidCurrency(
                "currency code cannot be empty".to_string(),
            ));
        }
        if code.chars().any(char::is_whitespace) {
            return Err(RateError::InvalidCurrency(format!(
                "currency code cannot contain spaces: {code:?}"
            )));
        }
        let len = code.chars().count();
        if !(2..=5).contains(&len) {
            return Err(RateError::InvalidCurrency(format!(
                "currency code must be 2-5 characters: {code:?}"
            )));
        }
        if code.contains(PAIR_SEPARATOR) {
            return Err(RateError::InvalidCurrency(format!(
                "currency code cannot contain '{PAIR_SEPARATOR}': {code:?}"
            )));
        }

        Ok(Self(code.to_uppercase()))
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Currency {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = RateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// An ordered conversion pair: one unit of `from` costs `rate` units of `to`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyPair {
    pub from: Currency,
    pub to: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(from: Currency, to: Currency) -> Self {
        Self { from, to }
    }

    /// Build a pair from two raw codes.
    pub fn from_codes(from: &str, to: &str) -> Result<Self, RateError> {
        Ok(Self::new(Currency::parse(from)?, Currency::parse(to)?))
    }

    /// Get the reverse pair.
    pub fn inverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }

    /// Whether both sides are the same currency.
    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    /// Storage key, `FROM_TO`.
    pub fn key(&self) -> String {
        format!("{}{}{}", self.from, PAIR_SEPARATOR, self.to)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.from, PAIR_SEPARATOR, self.to)
    }
}

impl FromStr for CurrencyPair {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(PAIR_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(from), Some(to), None) => Self::from_codes(from, to),
            _ => Err(RateError::InvalidCurrency(format!(
                "pair key must look like FROM_TO: {s:?}"
            ))),
        }
    }
}

impl TryFrom<String> for CurrencyPair {
    type Error = RateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyPair> for String {
    fn from(pair: CurrencyPair) -> Self {
        pair.key()
    }
}
