//! Ratekeeper Daemon
//!
//! Service configuration, logging setup, the periodic update scheduler and
//! the [`RateService`] facade used by the `ratekeeper` binary.

pub mod config;
pub mod logging;
pub mod scheduler;
pub mod service;

pub use config::{LogFormat, ServiceConfig};
pub use scheduler::RatesScheduler;
pub use service::{build_sources, RateService};
