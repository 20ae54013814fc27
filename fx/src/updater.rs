//! Multi-source rate updates.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ratekeeper_common::{time, RateMap, Result, Timestamp};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::cache::RateCache;
use crate::history::RateHistory;
use crate::source::RateSource;

/// Filter selecting the crypto source.
pub const CRYPTO_FILTER: &str = "coingecko";
/// Filter selecting the fiat source.
pub const FIAT_FILTER: &str = "exchangerate";

/// Outcome of one source within an update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    /// Rates fetched; zero on failure.
    pub rates: usize,
    pub error: Option<String>,
}

/// Result of a single update run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    /// At least one rate was merged.
    pub success: bool,
    /// Distinct pairs merged in this run.
    pub total_rates: usize,
    pub sources: BTreeMap<String, SourceReport>,
    /// `"<source>: <message>"` per failed source, in fetch order.
    pub errors: Vec<String>,
    #[serde(with = "time::iso8601::option")]
    pub last_refresh: Option<Timestamp>,
}

/// Fetches from every configured source, merges, and persists.
pub struct RatesUpdater {
    sources: Vec<Arc<dyn RateSource>>,
    cache: RateCache,
    history: RateHistory,
}

impl fmt::Debug for RatesUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatesUpdater")
            .field("sources", &self.source_names())
            .field("cache", &self.cache)
            .field("history", &self.history)
            .finish()
    }
}

impl RatesUpdater {
    /// Create an updater. Sources are queried in the given order.
    pub fn new(sources: Vec<Arc<dyn RateSource>>, cache: RateCache, history: RateHistory) -> Self {
        Self {
            sources,
            cache,
            history,
        }
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }

    pub fn history(&self) -> &RateHistory {
        &self.history
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run one update across all sources, or those matching `filter`.
    ///
    /// Source failures are recorded in the report and never abort the run.
    /// Only a failure to persist merged rates is returned as an error.
    #[instrument(skip(self))]
    pub async fn run_update(&self, filter: Option<&str>) -> Result<UpdateReport> {
        info!("Starting rates update");

        let mut report = UpdateReport {
            success: false,
            total_rates: 0,
            sources: BTreeMap::new(),
            errors: Vec::new(),
            last_refresh: None,
        };
        let mut merged = RateMap::new();

        for source in self.select_sources(filter) {
            let name = source.name().to_string();

            match source.fetch_rates().await {
                Ok(rates) => {
                    info!(source = %name, rates = rates.len(), "Source OK");
                    report.sources.insert(
                        name,
                        SourceReport {
                            rates: rates.len(),
                            error: None,
                        },
                    );
                    // Later sources win for pairs fetched twice in one run.
                    merged.extend(rates);
                }
                Err(e) => {
                    error!(source = %name, error = %e, "Source failed");
                    let message = e.to_string();
                    report.errors.push(format!("{name}: {message}"));
                    report.sources.insert(
                        name,
                        SourceReport {
                            rates: 0,
                            error: Some(message),
                        },
                    );
                }
            }
        }

        if !merged.is_empty() {
            let saved = self.cache.save(&merged)?;
            self.history.append(&merged)?;
            report.total_rates = merged.len();
            report.last_refresh = saved.last_refresh;
            report.success = true;
        } else {
            warn!("No rates fetched, nothing written");
        }

        info!(
            success = report.success,
            total_rates = report.total_rates,
            errors = report.errors.len(),
            "Update completed"
        );
        Ok(report)
    }

    /// Update only the crypto source.
    pub async fn update_crypto_only(&self) -> Result<UpdateReport> {
        self.run_update(Some(CRYPTO_FILTER)).await
    }

    /// Update only the fiat source.
    pub async fn update_fiat_only(&self) -> Result<UpdateReport> {
        self.run_update(Some(FIAT_FILTER)).await
    }

    /// Sources whose name contains the filter or is contained in it, ignoring
    /// case. A filter matching nothing selects every source.
    fn select_sources(&self, filter: Option<&str>) -> Vec<&Arc<dyn RateSource>> {
        let Some(filter) = filter.map(str::to_lowercase).filter(|f| !f.is_empty()) else {
            return self.sources.iter().collect();
        };

        let selected: Vec<_> = self
            .sources
            .iter()
            .filter(|source| {
                let name = source.name().to_lowercase();
                name.contains(&filter) || filter.contains(&name)
            })
            .collect();

        if selected.is_empty() {
            warn!(filter = %filter, "No source matches filter, using all sources");
            return self.sources.iter().collect();
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockRateSource;
    use ratekeeper_common::{CurrencyPair, UnavailableReason};

    struct Fixture {
        _dir: tempfile::TempDir,
        crypto: Arc<MockRateSource>,
        fiat: Arc<MockRateSource>,
        updater: RatesUpdater,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let crypto = Arc::new(MockRateSource::new("CoinGecko"));
        let fiat = Arc::new(MockRateSource::new("ExchangeRate-API"));
        let updater = RatesUpdater::new(
            vec![crypto.clone() as Arc<dyn RateSource>, fiat.clone()],
            RateCache::new(dir.path().join("rates.json")),
            RateHistory::new(dir.path().join("exchange_rates.json")),
        );
        Fixture {
            _dir: dir,
            crypto,
            fiat,
            updater,
        }
    }

    fn pair(key: &str) -> CurrencyPair {
        key.parse().unwrap()
    }

    #[tokio::test]
    async fn test_partial_failure_still_succeeds() {
        let f = fixture();
        f.crypto.set_rate("BTC_USD", 60000.0);
        f.crypto.set_rate("ETH_USD", 3000.0);
        f.crypto.set_rate("LTC_USD", 80.0);
        f.fiat.fail_with(UnavailableReason::Timeout);

        let report = f.updater.run_update(None).await.unwrap();

        assert!(report.success);
        assert_eq!(report.total_rates, 3);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("ExchangeRate-API: "));
        assert!(report.last_refresh.is_some());

        let failed = &report.sources["ExchangeRate-API"];
        assert_eq!(failed.rates, 0);
        assert!(failed.error.is_some());
        assert_eq!(report.sources["CoinGecko"].rates, 3);
        assert_eq!(report.sources["CoinGecko"].error, None);

        assert_eq!(f.updater.cache().load().len(), 3);
        assert_eq!(f.updater.history().load().len(), 3);
    }

    #[tokio::test]
    async fn test_report_refresh_matches_cache() {
        let f = fixture();
        f.crypto.set_rate("BTC_USD", 60000.0);

        let report = f.updater.run_update(None).await.unwrap();

        assert!(report.last_refresh.is_some());
        assert_eq!(report.last_refresh, f.updater.cache().load().last_refresh);
    }

    #[tokio::test]
    async fn test_all_sources_failing_writes_nothing() {
        let f = fixture();
        f.crypto.fail_with(UnavailableReason::RateLimited);
        f.fiat.fail_with(UnavailableReason::InvalidCredentials);

        let report = f.updater.run_update(None).await.unwrap();

        assert!(!report.success);
        assert_eq!(report.total_rates, 0);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.last_refresh, None);
        assert!(!f.updater.cache().path().exists());
        assert!(!f.updater.history().path().exists());
    }

    #[tokio::test]
    async fn test_filter_matches_either_direction() {
        let f = fixture();
        f.crypto.set_rate("BTC_USD", 60000.0);
        f.fiat.set_rate("EUR_USD", 0.92);

        let report = f.updater.update_crypto_only().await.unwrap();
        assert_eq!(report.sources.keys().collect::<Vec<_>>(), vec!["CoinGecko"]);
        assert_eq!((f.crypto.calls(), f.fiat.calls()), (1, 0));

        // Filter containing the source name.
        f.updater.run_update(Some("the exchangerate-api feed")).await.unwrap();
        assert_eq!((f.crypto.calls(), f.fiat.calls()), (1, 1));

        f.updater.update_fiat_only().await.unwrap();
        assert_eq!((f.crypto.calls(), f.fiat.calls()), (1, 2));
    }

    #[tokio::test]
    async fn test_unmatched_filter_uses_all_sources() {
        let f = fixture();
        f.crypto.set_rate("BTC_USD", 60000.0);
        f.fiat.set_rate("EUR_USD", 0.92);

        let report = f.updater.run_update(Some("nonexistent")).await.unwrap();

        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.total_rates, 2);
        assert_eq!((f.crypto.calls(), f.fiat.calls()), (1, 1));
    }

    #[tokio::test]
    async fn test_later_source_wins_within_run() {
        let f = fixture();
        f.crypto.set_rate("USDT_USD", 0.999);
        f.fiat.set_rate("USDT_USD", 1.001);

        let report = f.updater.run_update(None).await.unwrap();

        assert_eq!(report.total_rates, 1);
        let stored = f.updater.cache().get_rate(&pair("USDT_USD")).unwrap();
        assert_eq!(stored.rate, 1.001);
        assert_eq!(stored.source, "ExchangeRate-API");
    }

    #[tokio::test]
    async fn test_report_serializes_with_expected_fields() {
        let f = fixture();
        f.crypto.set_rate("BTC_USD", 60000.0);
        f.fiat.fail_with(UnavailableReason::Timeout);

        let report = f.updater.run_update(None).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["total_rates"], 1);
        assert_eq!(json["sources"]["CoinGecko"]["rates"], 1);
        assert!(json["sources"]["CoinGecko"]["error"].is_null());
        assert!(json["last_refresh"].as_str().unwrap().ends_with('Z'));
    }
}
