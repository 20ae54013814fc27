//! Rate source trait and the mock source used in tests.

use async_trait::async_trait;
use ratekeeper_common::{RateMap, Result};

/// A single external rate provider.
///
/// Implementations stamp every observation with their own [`name`](Self::name)
/// and the fetch time. An empty map is a valid answer; failures are reported as
/// [`RateError::SourceUnavailable`](ratekeeper_common::RateError::SourceUnavailable).
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Fetch every tracked rate this source knows about.
    async fn fetch_rates(&self) -> Result<RateMap>;
}

/// Mock rate source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockRateSource;

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use dashmap::DashMap;
    use parking_lot::Mutex;
    use ratekeeper_common::{
        time, CurrencyPair, RateError, RateMap, RateObservation, Result, Timestamp,
        UnavailableReason,
    };

    use super::RateSource;

    pub struct MockRateSource {
        name: String,
        rates: DashMap<CurrencyPair, f64>,
        failure: Mutex<Option<UnavailableReason>>,
        observed_at: Mutex<Option<Timestamp>>,
        delay: Mutex<Option<Duration>>,
        calls: AtomicUsize,
    }

    impl MockRateSource {
        /// Create a new mock source.
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                rates: DashMap::new(),
                failure: Mutex::new(None),
                observed_at: Mutex::new(None),
                delay: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }

        /// Set a rate for a `FROM_TO` pair key.
        pub fn set_rate(&self, pair: &str, rate: f64) {
            let pair = pair.parse().expect("valid pair key");
            self.rates.insert(pair, rate);
        }

        /// Make every following fetch fail with `reason`.
        pub fn fail_with(&self, reason: UnavailableReason) {
            *self.failure.lock() = Some(reason);
        }

        /// Stamp observations with a fixed time instead of now.
        pub fn set_observed_at(&self, ts: Timestamp) {
            *self.observed_at.lock() = Some(ts);
        }

        /// Make every following fetch take at least `delay`.
        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = Some(delay);
        }

        /// Number of fetches started so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateSource for MockRateSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch_rates(&self) -> Result<RateMap> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(reason) = self.failure.lock().clone() {
                return Err(RateError::unavailable(&self.name, reason));
            }

            let observed_at = self.observed_at.lock().unwrap_or_else(time::now);
            self.rates
                .iter()
                .map(|entry| {
                    let obs = RateObservation::with_timestamp(
                        entry.key().clone(),
                        *entry.value(),
                        observed_at,
                        self.name.clone(),
                    )?;
                    Ok((entry.key().clone(), obs))
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratekeeper_common::{RateError, UnavailableReason};

    #[tokio::test]
    async fn test_mock_source() {
        let source = MockRateSource::new("test");
        source.set_rate("BTC_USD", 60000.0);
        source.set_rate("ETH_USD", 3000.0);

        let rates = source.fetch_rates().await.unwrap();

        assert_eq!(rates.len(), 2);
        let btc = rates.get(&"BTC_USD".parse().unwrap()).unwrap();
        assert_eq!(btc.rate(), 60000.0);
        assert_eq!(btc.source(), "test");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_source_failure() {
        let source = MockRateSource::new("test");
        source.set_rate("BTC_USD", 60000.0);
        source.fail_with(UnavailableReason::Timeout);

        let result = source.fetch_rates().await;

        assert!(matches!(
            result,
            Err(RateError::SourceUnavailable {
                reason: UnavailableReason::Timeout,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_mock_source_delay() {
        let source = MockRateSource::new("slow");
        source.set_rate("BTC_USD", 60000.0);
        source.set_delay(std::time::Duration::from_millis(50));

        let started = std::time::Instant::now();
        let rates = source.fetch_rates().await.unwrap();

        assert!(started.elapsed() >= std::time::Duration::from_millis(50));
        assert_eq!(rates.len(), 1);
    }
}
