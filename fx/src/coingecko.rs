//! CoinGecko crypto price client.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use async_trait::async_trait;
use ratekeeper_common::{time, Currency, CurrencyPair, RateMap, RateObservation, Result};
use tracing::{info, warn};

use crate::http;
use crate::source::RateSource;

/// Crypto tickers priced against one base currency via `/simple/price`.
pub struct CoinGeckoSource {
    client: reqwest::Client,
    url: String,
    base: Currency,
    /// Ticker to CoinGecko coin id (`BTC` -> `bitcoin`).
    coin_ids: BTreeMap<Currency, String>,
}

impl CoinGeckoSource {
    pub const NAME: &'static str = "CoinGecko";

    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        base: Currency,
        coin_ids: BTreeMap<Currency, String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            base,
            coin_ids,
        }
    }

    fn request_url(&self) -> String {
        let ids = self
            .coin_ids
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}?ids={}&vs_currencies={}",
            self.url,
            ids,
            self.base.code().to_lowercase()
        )
    }

    fn ticker_for(&self, coin_id: &str) -> Option<&Currency> {
        self.coin_ids
            .iter()
            .find(|(_, id)| id.as_str() == coin_id)
            .map(|(ticker, _)| ticker)
    }
}

#[async_trait]
impl RateSource for CoinGeckoSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_rates(&self) -> Result<RateMap> {
        let url = self.request_url();
        info!(source = Self::NAME, %url, "Fetching rates");
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| http::request_error(Self::NAME, e))?;
        let response = http::ensure_success(Self::NAME, response).await?;
        let status_code = response.status().as_u16();

        let body: HashMap<String, HashMap<String, f64>> = response
            .json()
            .await
            .map_err(|e| http::request_error(Self::NAME, e))?;
        let request_ms = started.elapsed().as_millis() as u64;

        let observed_at = time::now();
        let vs_currency = self.base.code().to_lowercase();
        let mut rates = RateMap::new();

        for (coin_id, prices) in &body {
            let (Some(ticker), Some(price)) = (self.ticker_for(coin_id), prices.get(&vs_currency))
            else {
                continue;
            };

            let pair = CurrencyPair::new(ticker.clone(), self.base.clone());
            match RateObservation::with_timestamp(pair.clone(), *price, observed_at, Self::NAME) {
                Ok(obs) => {
                    let obs = obs
                        .with_meta("raw_id", coin_id.as_str())
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

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use ratekeeper_common::{RateError, UnavailableReason};
    use std::time::Duration;

    fn coin_ids() -> BTreeMap<Currency, String> {
        [("BTC", "bitcoin"), ("ETH", "ethereum"), ("DOGE", "dogecoin")]
            .into_iter()
            .map(|(t, id)| (Currency::parse(t).unwrap(), id.to_string()))
            .collect()
    }

    fn source_for(server: &mockito::Server) -> CoinGeckoSource {
        CoinGeckoSource::new(
            http::build_client(Duration::from_secs(10)).unwrap(),
            format!("{}/simple/price", server.url()),
            Currency::usd(),
            coin_ids(),
        )
    }

    #[tokio::test]
    async fn test_fetch_rates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/simple/price")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("ids".into(), "bitcoin,dogecoin,ethereum".into()),
                Matcher::UrlEncoded("vs_currencies".into(), "usd".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"bitcoin":{"usd":59337.21},"ethereum":{"usd":3120.5},"unknowncoin":{"usd":1.0}}"#)
            .create_async()
            .await;

        let rates = source_for(&server).fetch_rates().await.unwrap();

        mock.assert_async().await;
        assert_eq!(rates.len(), 2);
        let btc = &rates[&"BTC_USD".parse().unwrap()];
        assert_eq!(btc.rate(), 59337.21);
        assert_eq!(btc.source(), "CoinGecko");
        assert_eq!(btc.meta()["raw_id"], "bitcoin");
        assert_eq!(btc.meta()["status_code"], 200);
        assert!(rates.contains_key(&"ETH_USD".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_no_tracked_coins_is_empty_not_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"bitcoin":{"eur":55000.0}}"#)
            .create_async()
            .await;

        let rates = source_for(&server).fetch_rates().await.unwrap();

        assert!(rates.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let err = source_for(&server).fetch_rates().await.unwrap_err();

        assert!(matches!(
            err,
            RateError::SourceUnavailable {
                reason: UnavailableReason::RateLimited,
                ..
            }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_keeps_body_excerpt() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let err = source_for(&server).fetch_rates().await.unwrap_err();

        match err {
            RateError::SourceUnavailable {
                reason: UnavailableReason::HttpStatus { status, body },
                ..
            } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/simple/price")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let err = source_for(&server).fetch_rates().await.unwrap_err();

        assert!(matches!(
            err,
            RateError::SourceUnavailable {
                reason: UnavailableReason::Parse(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let source = CoinGeckoSource::new(
            http::build_client(Duration::from_secs(2)).unwrap(),
            "http://127.0.0.1:1/simple/price",
            Currency::usd(),
            coin_ids(),
        );

        let err = source.fetch_rates().await.unwrap_err();

        assert_eq!(err.error_code(), "SOURCE_CONNECTION");
    }

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        // Accepts connections but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let source = CoinGeckoSource::new(
            http::build_client(Duration::from_millis(200)).unwrap(),
            format!("http://{addr}/simple/price"),
            Currency::usd(),
            coin_ids(),
        );

        let err = source.fetch_rates().await.unwrap_err();

        assert!(matches!(
            err,
            RateError::SourceUnavailable {
                reason: UnavailableReason::Timeout,
                ..
            }
        ));
        assert!(err.is_retryable());
        server.abort();
    }
}
