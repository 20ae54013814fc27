//! Service configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ratekeeper_common::{Currency, RateError, Result};
use serde::Deserialize;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            // "string" is what older settings files call the plain format.
            "text" | "string" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding the cache and history files.
    pub data_dir: PathBuf,
    /// Cache file name inside `data_dir`.
    pub rates_file: String,
    /// History file name inside `data_dir`.
    pub history_file: String,
    /// Currency every rate is quoted against.
    pub base_currency: Currency,
    /// Fiat currencies to track.
    pub fiat_currencies: Vec<Currency>,
    /// Crypto tickers to track, mapped to CoinGecko coin ids.
    pub crypto_currencies: BTreeMap<Currency, String>,
    pub coingecko_url: String,
    pub exchangerate_url: String,
    /// ExchangeRate-API key. The fiat source fails at fetch time without it.
    pub exchangerate_api_key: Option<String>,
    /// Per-request timeout for every source.
    pub request_timeout: Duration,
    /// Delay between scheduled updates.
    pub update_interval: Duration,
    /// Age after which cached rates are reported stale.
    pub rates_ttl: Duration,
    /// How long `stop` waits for the scheduler loop to exit.
    pub stop_grace: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            rates_file: "rates.json".to_string(),
            history_file: "exchange_rates.json".to_string(),
            base_currency: Currency::usd(),
            fiat_currencies: codes(&["EUR", "GBP", "RUB", "JPY", "CNY"]),
            crypto_currencies: [
                ("BTC", "bitcoin"),
                ("ETH", "ethereum"),
                ("LTC", "litecoin"),
                ("XRP", "ripple"),
                ("DOGE", "dogecoin"),
            ]
            .into_iter()
            .filter_map(|(ticker, id)| Some((Currency::parse(ticker).ok()?, id.to_string())))
            .collect(),
            coingecko_url: "https://api.coingecko.com/api/v3/simple/price".to_string(),
            exchangerate_url: "https://v6.exchangerate-api.com/v6".to_string(),
            exchangerate_api_key: None,
            request_timeout: Duration::from_secs(10),
            update_interval: Duration::from_secs(300),
            rates_ttl: Duration::from_secs(300),
            stop_grace: Duration::from_secs(5),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

fn codes(values: &[&str]) -> Vec<Currency> {
    values.iter().filter_map(|c| Currency::parse(c).ok()).collect()
}

/// Optional overrides read from a JSON settings file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    data_dir: Option<PathBuf>,
    rates_file: Option<String>,
    history_file: Option<String>,
    #[serde(alias = "default_base_currency")]
    base_currency: Option<Currency>,
    fiat_currencies: Option<Vec<Currency>>,
    crypto_currencies: Option<BTreeMap<Currency, String>>,
    coingecko_url: Option<String>,
    exchangerate_url: Option<String>,
    exchangerate_api_key: Option<String>,
    request_timeout_seconds: Option<u64>,
    update_interval_seconds: Option<u64>,
    rates_ttl_seconds: Option<u64>,
    stop_grace_seconds: Option<u64>,
    log_level: Option<String>,
    log_format: Option<String>,
}

impl ServiceConfig {
    /// Load configuration: defaults, then the optional settings file, then
    /// environment variables.
    pub fn load(settings_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = settings_path {
            config.apply_file(path)?;
        }
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read(path).map_err(|e| RateError::persistence(path, e))?;
        let file: SettingsFile = serde_json::from_slice(&raw).map_err(|e| {
            RateError::Configuration(format!("invalid settings file {}: {e}", path.display()))
        })?;

        let secs = Duration::from_secs;
        if let Some(v) = file.data_dir {
            self.data_dir = v;
        }
        if let Some(v) = file.rates_file {
            self.rates_file = v;
        }
        if let Some(v) = file.history_file {
            self.history_file = v;
        }
        if let Some(v) = file.base_currency {
            self.base_currency = v;
        }
        if let Some(v) = file.fiat_currencies {
            self.fiat_currencies = v;
        }
        if let Some(v) = file.crypto_currencies {
            self.crypto_currencies = v;
        }
        if let Some(v) = file.coingecko_url {
            self.coingecko_url = v;
        }
        if let Some(v) = file.exchangerate_url {
            self.exchangerate_url = v;
        }
        if let Some(v) = file.exchangerate_api_key {
            self.exchangerate_api_key = Some(v);
        }
        if let Some(v) = file.request_timeout_seconds {
            self.request_timeout = secs(v);
        }
        if let Some(v) = file.update_interval_seconds {
            self.update_interval = secs(v);
        }
        if let Some(v) = file.rates_ttl_seconds {
            self.rates_ttl = secs(v);
        }
        if let Some(v) = file.stop_grace_seconds {
            self.stop_grace = secs(v);
        }
        if let Some(v) = file.log_level {
            self.log_level = v;
        }
        if let Some(v) = file.log_format {
            self.log_format = LogFormat::parse(&v).ok_or_else(|| {
                RateError::Configuration(format!("unknown log format: {v}"))
            })?;
        }
        Ok(())
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let secs = |key: &str| var(key).and_then(|v| v.trim().parse().ok()).map(Duration::from_secs);

        if let Some(dir) = var("RATES_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(base) = var("RATES_BASE_CURRENCY").and_then(|v| Currency::parse(&v).ok()) {
            self.base_currency = base;
        }

        if let Some(key) = var("EXCHANGERATE_API_KEY").filter(|k| !k.is_empty()) {
            self.exchangerate_api_key = Some(key);
        }

        if let Some(interval) = secs("RATES_UPDATE_INTERVAL_SECS") {
            self.update_interval = interval;
        }

        if let Some(ttl) = secs("RATES_TTL_SECS") {
            self.rates_ttl = ttl;
        }

        if let Some(timeout) = secs("RATES_REQUEST_TIMEOUT_SECS") {
            self.request_timeout = timeout;
        }

        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level;
        }

        if let Some(format) = var("LOG_FORMAT").and_then(|v| LogFormat::parse(&v)) {
            self.log_format = format;
        }
    }

    /// Path of the rate cache file.
    pub fn rates_path(&self) -> PathBuf {
        self.data_dir.join(&self.rates_file)
    }

    /// Path of the rate history file.
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(&self.history_file)
    }

    /// Validate configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.request_timeout.is_zero() {
            return Err("Request timeout cannot be 0".to_string());
        }

        if self.update_interval.is_zero() {
            return Err("Update interval cannot be 0".to_string());
        }

        if self.fiat_currencies.is_empty() && self.crypto_currencies.is_empty() {
            return Err("At least one currency must be tracked".to_string());
        }

        if self.crypto_currencies.values().any(|id| id.trim().is_empty()) {
            return Err("CoinGecko ids cannot be empty".to_string());
        }

        if self.rates_file.is_empty() || self.history_file.is_empty() {
            return Err("Rates and history file names cannot be empty".to_string());
        }

        if self.rates_file == self.history_file {
            return Err("Rates and history files must differ".to_string());
        }

        Ok(())
    }
}
