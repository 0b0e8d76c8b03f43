//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before the retry that follows attempt `attempt_index` (0-based).
///
/// `base * 2^attempt_index + uniform(0..=jitter)`.
pub fn calculate_backoff(attempt_index: u32, base: Duration, jitter: Duration) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let exponential = 2u64.saturating_pow(attempt_index);
    let delay_ms = base_ms.saturating_mul(exponential);

    let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
    let jitter = if jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=jitter_ms)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter))
}
