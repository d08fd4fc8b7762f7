use std::time::Duration;

/// Base delay before the first retry of a page fetch
pub const BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Computes the capped exponential backoff `min(base * 2^attempt, cap)`
///
/// `attempt` is zero for the wait before the first retry. The result never
/// exceeds `cap`, including for attempts large enough to overflow.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(Duration::MAX).min(cap)
}
