//! Exponential backoff with optional jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt + 1`.
///
/// `attempt` is zero-indexed: the first retry waits `initial`, each later one
/// doubles, and no delay exceeds `max`.
pub fn compute_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    initial.checked_mul(factor).unwrap_or(max).min(max)
}

/// Add uniform jitter in `[0, delay * ratio)`.
pub fn apply_jitter(delay: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 {
        return delay;
    }

    let jitter_range = delay.mul_f64(ratio.min(1.0));
    if jitter_range.is_zero() {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(Duration::ZERO..jitter_range);
    delay + jitter
}
