//! Retry delays: exponential growth with jitter, capped per policy.

use crate::gateway::domain::RetryPolicy;
use rand::Rng;
use std::time::Duration;

/// Upper bound of the delay before retry number `retry` (one-based).
///
/// The bound doubles from `initial_backoff` and saturates at `max_backoff`.
#[must_use]
pub fn backoff_ceiling(policy: RetryPolicy, retry: u32) -> Duration {
    if retry == 0 {
        return Duration::ZERO;
    }
    let initial_ms = millis(policy.initial_backoff());
    let max_ms = millis(policy.max_backoff());
    let exponent = retry.saturating_sub(1).min(30);
    let candidate = initial_ms.saturating_mul(1_u64 << exponent);
    Duration::from_millis(candidate.min(max_ms))
}

/// Jittered delay in `[ceiling / 2, ceiling]`.
#[must_use]
pub fn backoff_delay(policy: RetryPolicy, retry: u32, rng: &mut impl Rng) -> Duration {
    let ceiling = millis(backoff_ceiling(policy, retry));
    if ceiling == 0 {
        return Duration::ZERO;
    }
    let floor = ceiling.div_ceil(2);
    Duration::from_millis(rng.gen_range(floor..=ceiling))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
