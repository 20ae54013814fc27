//! Rate observations.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{RateError, Result};
use crate::time::{self, Timestamp};
use crate::CurrencyPair;

/// Observations of one fetch or merge, keyed by pair.
///
/// Iteration order is the pair key order, which keeps file output stable.
pub type RateMap = BTreeMap<CurrencyPair, RateObservation>;

/// One timestamped rate reading from one source for one pair.
///
/// Immutable once constructed; the constructor enforces `rate > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct RateObservation {
    pair: CurrencyPair,
    rate: f64,
    observed_at: Timestamp,
    source: String,
    meta: Map<String, Value>,
}

impl RateObservation {
    /// Create an observation stamped with the current time.
    pub fn new(pair: CurrencyPair, rate: f64, source: impl Into<String>) -> Result<Self> {
        Self::with_timestamp(pair, rate, time::now(), source)
    }

    /// Create an observation with an explicit timestamp.
    pub fn with_timestamp(
        pair: CurrencyPair,
        rate: f64,
        observed_at: Timestamp,
        source: impl Into<String>,
    ) -> Result<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(RateError::InvalidRate { pair, rate });
        }

        Ok(Self {
            pair,
            rate,
            observed_at,
            source: source.into(),
            meta: Map::new(),
        })
    }

    /// Attach provider metadata.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn pair(&self) -> &CurrencyPair {
        &self.pair
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn observed_at(&self) -> Timestamp {
        self.observed_at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// History identity, `FROM_TO_<ISO 8601 time>`.
    ///
    /// Two observations of the same pair at the same instant share an identity.
    pub fn identity(&self) -> String {
        format!("{}_{}", self.pair.key(), time::format_timestamp(&self.observed_at))
    }
}
