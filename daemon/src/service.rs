//! Rate service: wires sources, storage, updater, lookup and scheduler.

use std::collections::BTreeMap;
use std::sync::Arc;

use ratekeeper_common::{RateError, Result, Timestamp};
use ratekeeper_fx::{
    http, CachedRate, CoinGeckoSource, ExchangeRateApiSource, RateCache, RateHistory, RateLookup,
    RateQuote, RateSource, RatesUpdater, UpdateReport,
};
use tracing::{info, instrument};

use crate::config::ServiceConfig;
use crate::scheduler::RatesScheduler;

/// Build the configured sources: CoinGecko for crypto, then ExchangeRate-API
/// for fiat. A source with nothing to track is left out.
pub fn build_sources(config: &ServiceConfig) -> Result<Vec<Arc<dyn RateSource>>> {
    let client = http::build_client(config.request_timeout)?;
    let mut sources: Vec<Arc<dyn RateSource>> = Vec::new();

    if !config.crypto_currencies.is_empty() {
        sources.push(Arc::new(CoinGeckoSource::new(
            client.clone(),
            config.coingecko_url.clone(),
            config.base_currency.clone(),
            config.crypto_currencies.clone(),
        )));
    }

    if !config.fiat_currencies.is_empty() {
        sources.push(Arc::new(ExchangeRateApiSource::new(
            client,
            config.exchangerate_url.clone(),
            config.exchangerate_api_key.clone(),
            config.base_currency.clone(),
            config.fiat_currencies.clone(),
        )));
    }

    Ok(sources)
}

/// The rate service.
#[derive(Debug)]
pub struct RateService {
    config: ServiceConfig,
    updater: Arc<RatesUpdater>,
    lookup: RateLookup,
    scheduler: RatesScheduler,
}

impl RateService {
    /// Create a service with the sources described by `config`.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        config.validate().map_err(RateError::Configuration)?;
        let sources = build_sources(&config)?;
        Ok(Self::with_sources(config, sources))
    }

    /// Create a service over explicit sources.
    pub fn with_sources(config: ServiceConfig, sources: Vec<Arc<dyn RateSource>>) -> Self {
        let cache = RateCache::new(config.rates_path());
        let history = RateHistory::new(config.history_path());
        let updater = Arc::new(RatesUpdater::new(sources, cache.clone(), history));
        let lookup = RateLookup::new(cache, config.rates_ttl);
        let scheduler = RatesScheduler::new(updater.clone(), config.update_interval, config.stop_grace);

        info!(
            data_dir = %config.data_dir.display(),
            sources = ?updater.source_names(),
            "Rate service created"
        );

        Self {
            config,
            updater,
            lookup,
            scheduler,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn updater(&self) -> &Arc<RatesUpdater> {
        &self.updater
    }

    pub fn scheduler(&self) -> &RatesScheduler {
        &self.scheduler
    }

    /// Rate for one pair, with reverse-pair fallback.
    pub fn get_rate(&self, from: &str, to: &str) -> Result<RateQuote> {
        self.lookup.get_rate(from, to)
    }

    /// Every cached pair keyed by `FROM_TO`.
    pub fn get_all_rates(&self) -> BTreeMap<String, CachedRate> {
        self.lookup.get_all_rates()
    }

    pub fn last_refresh(&self) -> Option<Timestamp> {
        self.lookup.last_refresh()
    }

    /// Run one update now, independent of the scheduler.
    #[instrument(skip(self))]
    pub async fn run_update(&self, filter: Option<&str>) -> Result<UpdateReport> {
        self.updater.run_update(filter).await
    }

    /// Start periodic updates.
    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Stop periodic updates.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }
}
