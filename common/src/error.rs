//! Error types for Ratekeeper.

use std::path::PathBuf;

use thiserror::Error;

use crate::CurrencyPair;

/// Why a rate source could not deliver rates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    #[error("request timed out")]
    Timeout,

    #[error("failed to connect: {0}")]
    Connection(String),

    /// HTTP 429.
    #[error("rate limit exceeded (429), try again later")]
    RateLimited,

    /// HTTP 401.
    #[error("invalid API key")]
    InvalidCredentials,

    #[error("unexpected status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The provider answered but flagged the request as failed.
    #[error("provider error: {0}")]
    Provider(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("API key is not configured")]
    MissingApiKey,
}

/// Main error type for Ratekeeper operations.
#[derive(Error, Debug)]
pub enum RateError {
    /// One external provider failed; recovered by the updater.
    #[error("Error accessing {provider}: {reason}")]
    SourceUnavailable {
        provider: String,
        reason: UnavailableReason,
    },

    /// Neither the pair nor its reverse is cached.
    #[error("Rate not found for {0}")]
    PairNotFound(CurrencyPair),

    /// Writing or renaming a persisted file failed.
    #[error("Persistence failure at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    /// Rates must be finite and strictly positive.
    #[error("Invalid rate {rate} for {pair}")]
    InvalidRate { pair: CurrencyPair, rate: f64 },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RateError {
    pub fn unavailable(provider: impl Into<String>, reason: UnavailableReason) -> Self {
        RateError::SourceUnavailable {
            provider: provider.into(),
            reason,
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RateError::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Check if a later attempt could succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RateError::SourceUnavailable {
                reason: UnavailableReason::Timeout
                    | UnavailableReason::Connection(_)
                    | UnavailableReason::RateLimited,
                ..
            }
        )
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            RateError::SourceUnavailable { reason, .. } => match reason {
                UnavailableReason::Timeout => "SOURCE_TIMEOUT",
                UnavailableReason::Connection(_) => "SOURCE_CONNECTION",
                UnavailableReason::RateLimited => "SOURCE_RATE_LIMITED",
                UnavailableReason::InvalidCredentials => "SOURCE_INVALID_CREDENTIALS",
                UnavailableReason::HttpStatus { .. } => "SOURCE_HTTP_STATUS",
                UnavailableReason::Provider(_) => "SOURCE_PROVIDER_ERROR",
                UnavailableReason::Parse(_) => "SOURCE_PARSE",
                UnavailableReason::MissingApiKey => "SOURCE_MISSING_API_KEY",
            },
            RateError::PairNotFound(_) => "PAIR_NOT_FOUND",
            RateError::Persistence { .. } => "PERSISTENCE_FAILURE",
            RateError::Serialization(_) => "SERIALIZATION_ERROR",
            RateError::InvalidCurrency(_) => "INVALID_CURRENCY",
            RateError::InvalidRate { .. } => "INVALID_RATE",
            RateError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

impl From<serde_json::Error> for RateError {
    fn from(err: serde_json::Error) -> Self {
        RateError::Serialization(err.to_string())
    }
}

/// Result type alias for Ratekeeper operations.
pub type Result<T> = std::result::Result<T, RateError>;
