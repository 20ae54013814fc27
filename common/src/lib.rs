//! Ratekeeper Common Types
//!
//! Shared types for the rate service: currency codes and pairs, rate
//! observations, the error taxonomy and UTC time helpers.

pub mod currency;
pub mod error;
pub mod observation;
pub mod time;

pub use currency::*;
pub use error::*;
pub use observation::*;
pub use time::{Timestamp, format_timestamp, parse_timestamp};
