//! Threadscope Governor - admission control in front of the scraper.
//!
//! Two independent gates are consulted before any browser work happens:
//!
//! - [`rate_limit::RateLimiter`] - per-client point budget with escalating blocks
//! - [`resource::ConcurrencyGovernor`] - bounded parallelism, deadlines and a
//!   circuit breaker driven by failure, timeout and memory signals

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod rate_limit;
pub mod resource;

pub use rate_limit::{RateLimitDecision, RateLimitStats, RateLimitStatus, RateLimiter};
pub use resource::{
    CachedMemoryProbe, ConcurrencyGovernor, ConcurrencyStats, MemoryProbe, ResourceHealth,
    SysinfoMemoryProbe,
};
