//! # HTTP Middleware
//!
//! - `rate_limit` — fixed-window request limiter keyed by client address.
//! - `metrics` — in-process request/error counters.

pub mod metrics;
pub mod rate_limit;
