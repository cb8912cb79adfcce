//! Exponential back-off schedule for retried audit writes, mirroring the
//! shape the rest of this codebase uses for retried network calls:
//! `200ms → 400ms → 800ms → ...`, jittered to avoid synchronized retries.

use std::time::Duration;

use rand::Rng;

pub fn backoff(attempt: u32) -> Duration {
    let base_delay_ms = 200u64 * (1u64 << attempt.min(8));
    let jitter = rand::rng().random_range(0.8..1.2);
    Duration::from_millis((base_delay_ms as f64 * jitter) as u64)
}
