//! HTTP plumbing shared by the rate source clients.

use std::time::Duration;

use ratekeeper_common::{RateError, Result, UnavailableReason};
use reqwest::{Response, StatusCode};

/// Longest slice of an error body kept in a report.
const MAX_ERROR_BODY: usize = 200;

/// Build the client every source shares.
///
/// The timeout applies per request, so one slow provider never eats into
/// another provider's deadline.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ratekeeper/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RateError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Map a transport or decoding failure to a source error.
///
/// The request URL is stripped first: some providers carry credentials in the path.
pub(crate) fn request_error(provider: &str, err: reqwest::Error) -> RateError {
    let err = err.without_url();
    let reason = if err.is_timeout() {
        UnavailableReason::Timeout
    } else if err.is_decode() {
        UnavailableReason::Parse(err.to_string())
    } else {
        UnavailableReason::Connection(err.to_string())
    };
    RateError::unavailable(provider, reason)
}

/// Reject non-success responses.
///
/// 429 and 401 get their own reasons; anything else keeps the start of the body.
pub(crate) async fn ensure_success(provider: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let reason = match status {
        StatusCode::TOO_MANY_REQUESTS => UnavailableReason::RateLimited,
        StatusCode::UNAUTHORIZED => UnavailableReason::InvalidCredentials,
        _ => {
            let body = response.text().await.unwrap_or_default();
            UnavailableReason::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            }
        }
    };
    Err(RateError::unavailable(provider, reason))
}
