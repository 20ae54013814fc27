//! Read side: single-pair and bulk rate lookups over the cache.

use std::collections::BTreeMap;
use std::time::Duration;

use ratekeeper_common::{time, CurrencyPair, RateError, Result, Timestamp};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::cache::{CachedRate, RateCache};

/// Source reported for identity quotes.
pub const IDENTITY_SOURCE: &str = "identity";

/// A rate answer for one pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateQuote {
    pub pair: CurrencyPair,
    pub rate: f64,
    #[serde(with = "time::iso8601")]
    pub updated_at: Timestamp,
    pub source: String,
    /// The reverse pair was stored and this is its reciprocal.
    pub inverted: bool,
    /// Older than the configured time-to-live. Advisory only.
    pub is_stale: bool,
    #[serde(skip)]
    pub age: Duration,
}

/// Resolves rates from the cache, falling back to the reverse pair.
#[derive(Debug, Clone)]
pub struct RateLookup {
    cache: RateCache,
    ttl: Duration,
}

impl RateLookup {
    pub fn new(cache: RateCache, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Rate to convert one unit of `from` into `to`.
    ///
    /// Same-currency requests return 1.0 without touching storage. Stale
    /// entries are still returned, flagged with `is_stale`.
    #[instrument(skip(self))]
    pub fn get_rate(&self, from: &str, to: &str) -> Result<RateQuote> {
        let pair = CurrencyPair::from_codes(from, to)?;

        if pair.is_identity() {
            return Ok(RateQuote {
                pair,
                rate: 1.0,
                updated_at: time::now(),
                source: IDENTITY_SOURCE.to_string(),
                inverted: false,
                is_stale: false,
                age: Duration::ZERO,
            });
        }

        let snapshot = self.cache.load();

        let quote = if let Some(direct) = snapshot.get(&pair) {
            debug!("Direct rate found");
            self.quote(pair, direct, false)
        } else {
            match snapshot.get(&pair.inverse()) {
                Some(reverse) if reverse.rate != 0.0 => {
                    debug!("Using reciprocal of reverse rate");
                    let inverted = CachedRate {
                        rate: 1.0 / reverse.rate,
                        ..reverse.clone()
                    };
                    self.quote(pair, &inverted, true)
                }
                _ => return Err(RateError::PairNotFound(pair)),
            }
        };

        if quote.is_stale {
            warn!(
                pair = %quote.pair,
                age_secs = quote.age.as_secs(),
                ttl_secs = self.ttl.as_secs(),
                "Serving stale rate"
            );
        }
        Ok(quote)
    }

    /// Every stored pair as written, keyed by `FROM_TO`.
    pub fn get_all_rates(&self) -> BTreeMap<String, CachedRate> {
        self.cache
            .get_all_rates()
            .into_iter()
            .map(|(pair, rate)| (pair.key(), rate))
            .collect()
    }

    /// Time of the last successful save, if any.
    pub fn last_refresh(&self) -> Option<Timestamp> {
        self.cache.load().last_refresh
    }

    fn quote(&self, pair: CurrencyPair, entry: &CachedRate, inverted: bool) -> RateQuote {
        let age = time::age(&entry.updated_at);
        RateQuote {
            pair,
            rate: entry.rate,
            updated_at: entry.updated_at,
            source: entry.source.clone(),
            inverted,
            is_stale: age > self.ttl,
            age,
        }
    }
}
