//! Append-only rate history.
//!
//! Every observation ever merged is kept in one JSON array. Entries carry an
//! identity of `FROM_TO_<timestamp>`; appending an observation whose identity
//! is already present is a no-op. Entries are never edited or removed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ratekeeper_common::{time, RateMap, RateObservation, Result, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::atomic;

/// A single history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Identity used for deduplication.
    pub id: String,
    pub from_currency: String,
    pub to_currency: String,
    pub rate: f64,
    #[serde(with = "time::iso8601")]
    pub timestamp: Timestamp,
    pub source: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl HistoryEntry {
    /// Identity recomputed from the entry's fields.
    pub fn identity(&self) -> String {
        format!(
            "{}_{}_{}",
            self.from_currency,
            self.to_currency,
            time::format_timestamp(&self.timestamp)
        )
    }
}

impl From<&RateObservation> for HistoryEntry {
    fn from(obs: &RateObservation) -> Self {
        Self {
            id: obs.identity(),
            from_currency: obs.pair().from.code().to_string(),
            to_currency: obs.pair().to.code().to_string(),
            rate: obs.rate(),
            timestamp: obs.observed_at(),
            source: obs.source().to_string(),
            meta: obs.meta().clone(),
        }
    }
}

/// File-backed history log.
#[derive(Debug, Clone)]
pub struct RateHistory {
    path: PathBuf,
}

impl RateHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries in append order. Missing or corrupt files read as empty.
    ///
    /// Stored items that do not parse as [`HistoryEntry`] are skipped here but
    /// stay in the file.
    pub fn load(&self) -> Vec<HistoryEntry> {
        self.load_raw()
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<HistoryEntry>(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed history entry");
                    None
                }
            })
            .collect()
    }

    /// Append observations not yet recorded.
    ///
    /// Existing items are written back exactly as read. Returns the number of
    /// new entries; the file is only rewritten when that number is non-zero.
    pub fn append(&self, observations: &RateMap) -> Result<usize> {
        let mut items = self.load_raw();
        // Older files may spell the same instant differently, so both the stored
        // id and the normalised identity count as known.
        let mut known: HashSet<String> = HashSet::new();
        for item in &items {
            if let Some(id) = item.get("id").and_then(Value::as_str) {
                known.insert(id.to_string());
            }
            if let Ok(entry) = HistoryEntry::deserialize(item) {
                known.insert(entry.identity());
            }
        }

        let mut added = 0usize;
        for obs in observations.values() {
            let entry = HistoryEntry::from(obs);
            if known.insert(entry.id.clone()) {
                items.push(serde_json::to_value(&entry)?);
                added += 1;
            } else {
                debug!(id = %entry.id, "Skipping duplicate history entry");
            }
        }

        if added > 0 {
            atomic::write_json(&self.path, &items)?;
            info!(path = %self.path.display(), added, total = items.len(), "Appended history");
        }
        Ok(added)
    }

    fn load_raw(&self) -> Vec<Value> {
        match atomic::read_json(&self.path) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                warn!(path = %self.path.display(), "History file is not a JSON array, treating as empty");
                Vec::new()
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use ratekeeper_common::CurrencyPair;
    use std::fs;

    fn observation(key: &str, rate: f64, at: Timestamp) -> RateObservation {
        let pair: CurrencyPair = key.parse().unwrap();
        RateObservation::with_timestamp(pair, rate, at, "CoinGecko")
            .unwrap()
            .with_meta("raw_id", "bitcoin")
    }

    fn batch(items: &[RateObservation]) -> RateMap {
        items.iter().map(|o| (o.pair().clone(), o.clone())).collect()
    }

    fn history_in(dir: &tempfile::TempDir) -> RateHistory {
        RateHistory::new(dir.path().join("exchange_rates.json"))
    }

    #[test]
    fn test_append_records_entry() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(&dir);
        let at = Utc.with_ymd_and_hms(2025, 10, 9, 10, 30, 0).unwrap();

        let added = history
            .append(&batch(&[observation("BTC_USD", 59337.21, at)]))
            .unwrap();

        assert_eq!(added, 1);
        let entries = history.load();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id, "BTC_USD_2025-10-09T10:30:00Z");
        assert_eq!(entry.from_currency, "BTC");
        assert_eq!(entry.to_currency, "USD");
        assert_eq!(entry.source, "CoinGecko");
        assert_eq!(entry.meta["raw_id"], "bitcoin");
    }

    #[test]
    fn test_same_identity_is_recorded_once() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(&dir);
        let at = Utc.with_ymd_and_hms(2025, 10, 9, 10, 30, 0).unwrap();

        history.append(&batch(&[observation("BTC_USD", 59337.21, at)])).unwrap();
        // Same pair and instant, different rate: still the same identity.
        let added = history
            .append(&batch(&[observation("BTC_USD", 60000.0, at)]))
            .unwrap();

        assert_eq!(added, 0);
        let entries = history.load();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rate, 59337.21);
    }

    #[test]
    fn test_grows_in_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(&dir);
        let t1 = Utc.with_ymd_and_hms(2025, 10, 9, 10, 30, 0).unwrap();
        let t2 = t1 + Duration::minutes(5);

        history.append(&batch(&[observation("BTC_USD", 1.0, t1)])).unwrap();
        history
            .append(&batch(&[
                observation("BTC_USD", 2.0, t2),
                observation("ETH_USD", 3.0, t1),
            ]))
            .unwrap();

        let rates: Vec<f64> = history.load().iter().map(|e| e.rate).collect();
        assert_eq!(rates, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_no_write_without_new_entries() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(&dir);

        assert_eq!(history.append(&RateMap::new()).unwrap(), 0);

        assert!(!history.path().exists());
    }

    #[test]
    fn test_reads_offset_timestamps_from_older_files() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(&dir);
        fs::write(
            history.path(),
            r#"[{"id":"EUR_USD_2025-10-09T10:30:00+00:00","from_currency":"EUR","to_currency":"USD",
                "rate":0.92,"timestamp":"2025-10-09T10:30:00+00:00","source":"ExchangeRate-API","meta":{}},
               {"garbage": true}]"#,
        )
        .unwrap();

        let entries = history.load();
        let at = Utc.with_ymd_and_hms(2025, 10, 9, 10, 30, 0).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp, at);

        let pair: CurrencyPair = "EUR_USD".parse().unwrap();
        let same_instant = RateObservation::with_timestamp(pair, 0.92, at, "ExchangeRate-API").unwrap();
        assert_eq!(history.append(&batch(&[same_instant])).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(&dir);
        fs::write(history.path(), "[{\"id\": ").unwrap();

        assert!(history.load().is_empty());
    }

    #[test]
    fn test_append_keeps_existing_items_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(&dir);
        fs::write(
            history.path(),
            r#"[{"id":"EUR_USD_2025-10-09T10:30:00+00:00","from_currency":"EUR","to_currency":"USD",
                "rate":0.92,"timestamp":"2025-10-09T10:30:00+00:00","source":"ExchangeRate-API",
                "meta":{},"note":"imported"},
               {"id":"GBP_USD_2025-10-09T10:30:00","from_currency":"GBP","to_currency":"USD",
                "rate":0.79,"timestamp":"2025-10-09T10:30:00"}]"#,
        )
        .unwrap();
        let at = Utc.with_ymd_and_hms(2025, 10, 9, 11, 0, 0).unwrap();

        let added = history
            .append(&batch(&[observation("BTC_USD", 59337.21, at)]))
            .unwrap();

        assert_eq!(added, 1);
        let raw: Vec<Value> = serde_json::from_slice(&fs::read(history.path()).unwrap()).unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[0]["timestamp"], "2025-10-09T10:30:00+00:00");
        assert_eq!(raw[0]["note"], "imported");
        assert_eq!(raw[1]["from_currency"], "GBP");
        assert!(raw[1].get("source").is_none());
        assert_eq!(raw[2]["id"], "BTC_USD_2025-10-09T11:00:00Z");
    }

    #[test]
    fn test_unparsed_item_id_still_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let history = history_in(&dir);
        fs::write(
            history.path(),
            r#"[{"id":"GBP_USD_2025-10-09T10:30:00Z","rate":0.79}]"#,
        )
        .unwrap();
        let at = Utc.with_ymd_and_hms(2025, 10, 9, 10, 30, 0).unwrap();

        let added = history
            .append(&batch(&[observation("GBP_USD", 0.79, at)]))
            .unwrap();

        assert_eq!(added, 0);
    }
}
