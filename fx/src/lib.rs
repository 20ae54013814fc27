//! Ratekeeper FX
//!
//! Fetching, merging and persisting exchange rates.
//!
//! # Features
//!
//! - Pluggable rate sources (CoinGecko for crypto, ExchangeRate-API for fiat)
//! - Per-source failure isolation during updates
//! - File-backed cache that never regresses a pair to an older observation
//! - Append-only, deduplicated rate history
//! - Lookups with reverse-pair fallback and advisory staleness
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ratekeeper_fx::{RateCache, RateHistory, RateLookup, RatesUpdater};
//!
//! let cache = RateCache::new("data/rates.json");
//! let updater = RatesUpdater::new(sources, cache.clone(), RateHistory::new("data/exchange_rates.json"));
//! let report = updater.run_update(None).await?;
//!
//! let lookup = RateLookup::new(cache, Duration::from_secs(300));
//! let quote = lookup.get_rate("BTC", "USD")?;
//! ```

pub mod atomic;
pub mod cache;
pub mod coingecko;
pub mod exchangerate;
pub mod history;
pub mod http;
pub mod lookup;
pub mod source;
pub mod updater;

pub use cache::{CacheSnapshot, CachedRate, RateCache};
pub use coingecko::CoinGeckoSource;
pub use exchangerate::ExchangeRateApiSource;
pub use history::{HistoryEntry, RateHistory};
pub use lookup::{RateLookup, RateQuote};
pub use source::RateSource;
pub use updater::{RatesUpdater, SourceReport, UpdateReport};

#[cfg(any(test, feature = "test-utils"))]
pub use source::MockRateSource;
