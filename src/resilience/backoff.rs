//! Exponential backoff with optional jitter.

use std::time::Duration;

use rand::Rng;

/// Delay to wait after the failed attempt with index `attempt` (0-based).
///
/// `base * 2^attempt`, capped at `max`, plus up to `jitter_ratio` of the
/// capped delay on top.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration, jitter_ratio: f64) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    let capped = base.saturating_mul(factor).min(max);

    if jitter_ratio <= 0.0 {
        return capped;
    }

    let jitter_range = capped.as_secs_f64() * jitter_ratio.min(1.0);
    let jitter = rand::thread_rng().gen_range(0.0..=jitter_range);
    capped + Duration::from_secs_f64(jitter)
}
