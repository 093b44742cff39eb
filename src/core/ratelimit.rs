// Exhibitor Search - core/ratelimit.rs
//
// Throttling detection and retry backoff. Pure functions; the app layer
// supplies the random jitter and does the sleeping.

use crate::util::constants;
use std::time::Duration;

/// True when `text` contains any throttling keyword (case-insensitive).
///
/// Sites report throttling in different ways: HTTP 403/429 bodies, or a
/// 200 response whose message field says "请求过于频繁". Both end up as text
/// that passes through here.
pub fn is_rate_limited(text: &str) -> bool {
    let lower = text.to_lowercase();
    constants::RATE_LIMIT_KEYWORDS
        .iter()
        .any(|keyword| lower.contains(keyword))
}

/// Delay before retry number `attempt` (1-based).
///
/// `RETRY_BASE^attempt + jitter` seconds, capped at `RETRY_MAX_DELAY_SECS`.
/// Negative or non-finite jitter is treated as zero.
pub fn retry_delay(attempt: u32, jitter_secs: f64) -> Duration {
    let cap = constants::RETRY_MAX_DELAY_SECS as f64;
    let base = constants::RETRY_BASE.checked_pow(attempt).map_or(cap, |v| v as f64);
    let jitter = if jitter_secs.is_finite() && jitter_secs > 0.0 {
        jitter_secs
    } else {
        0.0
    };
    Duration::from_secs_f64((base + jitter).min(cap))
}
