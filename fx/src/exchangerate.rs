//! ExchangeRate-API fiat rate client.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use ratekeeper_common::{
    time, Currency, CurrencyPair, RateError, RateMap, RateObservation, Result, UnavailableReason,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::http;
use crate::source::RateSource;

/// Fiat currencies against one base via `/{key}/latest/{BASE}`.
///
/// The API quotes `BASE -> CUR`. Rates are stored under `CUR_BASE` with that
/// value unchanged; downstream readers rely on this labelling.
pub struct ExchangeRateApiSource {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    base: Currency,
    currencies: Vec<Currency>,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

impl ExchangeRateApiSource {
    pub const NAME: &'static str = "ExchangeRate-API";

    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        api_key: Option<String>,
        base: Currency,
        currencies: Vec<Currency>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            api_key,
            base,
            currencies,
        }
    }
}

#[async_trait]
impl RateSource for ExchangeRateApiSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_rates(&self) -> Result<RateMap> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| RateError::unavailable(Self::NAME, UnavailableReason::MissingApiKey))?;
        let url = format!("{}/{}/latest/{}", self.url, api_key, self.base);

        info!(source = Self::NAME, base = %self.base, "Fetching rates");
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| http::request_error(Self::NAME, e))?;
        let response = http::ensure_success(Self::NAME, response).await?;
        let status_code = response.status().as_u16();

        let body: LatestResponse = response
            .json()
            .await
            .map_err(|e| http::request_error(Self::NAME, e))?;
        let request_ms = started.elapsed().as_millis() as u64;

        if body.result != "success" {
            let error_type = body.error_type.unwrap_or_else(|| "unknown".to_string());
            return Err(RateError::unavailable(
                Self::NAME,
                UnavailableReason::Provider(error_type),
            ));
        }

        let observed_at = time::now();
        let mut rates = RateMap::new();

        for currency in &self.currencies {
            let Some(rate) = body.rates.get(currency.code()) else {
                continue;
            };

            let pair = CurrencyPair::new(currency.clone(), self.base.clone());
            match RateObservation::with_timestamp(pair.clone(), *rate, observed_at, Self::NAME) {
                Ok(obs) => {
                    let obs = obs
                        .with_meta("request_ms", request_ms)
                        .with_meta("status_code", status_code);
                    rates.insert(pair, obs);
                }
                Err(e) => warn!(source = Self::NAME, error = %e, "Skipping rate"),
            }
        }

        info!(source = Self::NAME, rates = rates.len(), request_ms, "Fetched rates");
        Ok(rates)
    }
}
