//! Linear backoff with optional jitter.

use std::time::Duration;
use rand::Rng;

/// Delay inserted after failed attempt `attempt` (1-based): `base * attempt`.
///
/// `jitter_ratio` adds up to that fraction of the delay on top; 0.0 keeps the
/// delay exact.
pub fn calculate_backoff(attempt: u32, base: Duration, jitter_ratio: f64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let delay = base.saturating_mul(attempt);
    if jitter_ratio <= 0.0 {
        return delay;
    }

    let jitter_range = delay.mul_f64(jitter_ratio.min(1.0));
    if jitter_range.is_zero() {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(Duration::ZERO..jitter_range);

    delay + jitter
}
