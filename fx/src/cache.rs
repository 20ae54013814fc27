//! Persistent rate cache.
//!
//! The cache file holds the best known rate per pair plus one refresh time for
//! the whole snapshot. Two shapes are accepted on read:
//!
//! ```json
//! {"pairs": {"BTC_USD": {"rate": 59337.21, "updated_at": "...", "source": "CoinGecko"}},
//!  "last_refresh": "..."}
//! ```
//!
//! and the older flat shape, where pair entries sit next to the reserved
//! `source` and `last_refresh` keys:
//!
//! ```json
//! {"BTC_USD": {"rate": 59337.21, "updated_at": "..."},
//!  "source": "ParserService", "last_refresh": "..."}
//! ```
//!
//! Writes always produce the nested shape.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ratekeeper_common::{parse_timestamp, time, CurrencyPair, RateMap, Result, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::atomic;

/// Top-level keys of the flat shape that are not pairs.
pub const RESERVED_KEYS: [&str; 2] = ["source", "last_refresh"];

/// Source recorded for entries that never stored one.
const UNKNOWN_SOURCE: &str = "unknown";

/// A cached rate. Observation metadata is not persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRate {
    pub rate: f64,
    #[serde(with = "time::iso8601")]
    pub updated_at: Timestamp,
    #[serde(default = "unknown_source")]
    pub source: String,
}

fn unknown_source() -> String {
    UNKNOWN_SOURCE.to_string()
}

/// Everything the cache file holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    pub pairs: BTreeMap<CurrencyPair, CachedRate>,
    pub last_refresh: Option<Timestamp>,
}

impl CacheSnapshot {
    pub fn get(&self, pair: &CurrencyPair) -> Option<&CachedRate> {
        self.pairs.get(pair)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn from_json(value: Value) -> Self {
        let Value::Object(mut root) = value else {
            warn!("Cache file is not a JSON object, treating as empty");
            return Self::default();
        };

        let (entries, last_refresh) = match root.remove("pairs") {
            Some(Value::Object(pairs)) => (pairs, root.remove("last_refresh")),
            Some(_) => {
                warn!("Cache file has a malformed pairs field, treating as empty");
                return Self::default();
            }
            None => {
                let last_refresh = root.remove("last_refresh");
                root.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
                (root, last_refresh)
            }
        };

        Self {
            pairs: entries
                .into_iter()
                .filter_map(|(key, value)| parse_entry(&key, value))
                .collect(),
            last_refresh: last_refresh
                .as_ref()
                .and_then(Value::as_str)
                .and_then(parse_timestamp),
        }
    }
}

fn parse_entry(key: &str, value: Value) -> Option<(CurrencyPair, CachedRate)> {
    let pair = match key.parse::<CurrencyPair>() {
        Ok(pair) => pair,
        Err(e) => {
            debug!(key, error = %e, "Skipping cache key");
            return None;
        }
    };
    match serde_json::from_value::<CachedRate>(value) {
        Ok(entry) if entry.rate.is_finite() && entry.rate > 0.0 => Some((pair, entry)),
        Ok(entry) => {
            warn!(pair = %pair, rate = entry.rate, "Skipping cached entry with invalid rate");
            None
        }
        Err(e) => {
            warn!(pair = %pair, error = %e, "Skipping malformed cache entry");
            None
        }
    }
}

#[derive(Serialize)]
struct CacheFile<'a> {
    pairs: BTreeMap<String, &'a CachedRate>,
    #[serde(with = "time::iso8601::option")]
    last_refresh: Option<Timestamp>,
}

/// File-backed rate cache.
#[derive(Debug, Clone)]
pub struct RateCache {
    path: PathBuf,
}

impl RateCache {
    /// Create a cache backed by `path`. Nothing is touched until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current snapshot. Missing or corrupt files read as empty.
    pub fn load(&self) -> CacheSnapshot {
        atomic::read_json(&self.path)
            .map(CacheSnapshot::from_json)
            .unwrap_or_default()
    }

    /// Merge `incoming` into the stored snapshot and rewrite the file.
    ///
    /// A pair is replaced only when the incoming observation is at least as
    /// recent as the stored one, so a pair never moves back in time.
    pub fn save(&self, incoming: &RateMap) -> Result<CacheSnapshot> {
        let mut snapshot = self.load();
        let mut updated = 0usize;

        for (pair, obs) in incoming {
            if let Some(existing) = snapshot.pairs.get(pair) {
                if obs.observed_at() < existing.updated_at {
                    debug!(
                        pair = %pair,
                        stored = %existing.updated_at,
                        incoming = %obs.observed_at(),
                        "Keeping newer cached rate"
                    );
                    continue;
                }
            }

            snapshot.pairs.insert(
                pair.clone(),
                CachedRate {
                    rate: obs.rate(),
                    updated_at: obs.observed_at(),
                    source: obs.source().to_string(),
                },
            );
            updated += 1;
        }

        snapshot.last_refresh = Some(time::now());

        let file = CacheFile {
            pairs: snapshot
                .pairs
                .iter()
                .map(|(pair, entry)| (pair.key(), entry))
                .collect(),
            last_refresh: snapshot.last_refresh,
        };
        atomic::write_json(&self.path, &file)?;

        info!(
            path = %self.path.display(),
            pairs = snapshot.len(),
            updated,
            "Saved rates"
        );
        Ok(snapshot)
    }

    /// Look up a single pair as stored, without reversing it.
    pub fn get_rate(&self, pair: &CurrencyPair) -> Option<CachedRate> {
        self.load().pairs.remove(pair)
    }

    /// All cached pairs.
    pub fn get_all_rates(&self) -> BTreeMap<CurrencyPair, CachedRate> {
        self.load().pairs
    }
}
