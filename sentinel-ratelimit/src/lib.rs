//! The token-bucket rate limiter: per-session admission control that runs
//! before any analysis, with continuous floating-point refill.

mod bucket;

pub use bucket::RateLimiter;
