use rand::Rng;
use std::time::Duration;

/// Defines how the wait between retry attempts is spaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// Every retry waits exactly the base delay.
    ///
    /// For example, if the delay is set to 10ms, each retry waits 10ms.
    #[default]
    Fixed,
    /// The wait doubles with each retry: `base`, `2 * base`, `4 * base`, ...
    ExponentialBackoff,
    /// The wait follows the Fibonacci sequence scaled by the base delay.
    ///
    /// With a base of 1 second the retries wait 1s, 1s, 2s, 3s, 5s, 8s, ...
    /// This grows more gently than exponential backoff.
    FibonacciBackoff,
}

impl RetryStrategy {
    /// Calculates the wait before retry number `retry`, where `1` is the first retry.
    ///
    /// - `Fixed`: always `base_delay`.
    /// - `ExponentialBackoff`: `base_delay * 2^(retry - 1)`.
    /// - `FibonacciBackoff`: `base_delay * fib(retry)` with `fib(1) = fib(2) = 1`.
    ///
    /// A `retry` of `0` is treated like the first retry. The result saturates at
    /// `Duration::MAX` instead of overflowing.
    pub fn calculate_delay(&self, base_delay: Duration, retry: usize) -> Duration {
        let retry = retry.max(1);
        match self {
            RetryStrategy::Fixed => base_delay,
            RetryStrategy::ExponentialBackoff => {
                let factor = u32::try_from(retry - 1)
                    .ok()
                    .and_then(|exp| 2u32.checked_pow(exp))
                    .unwrap_or(u32::MAX);
                base_delay.saturating_mul(factor)
            }
            RetryStrategy::FibonacciBackoff => {
                let (mut prev, mut curr) = (base_delay, base_delay);
                for _ in 2..retry {
                    let next = prev.saturating_add(curr);
                    prev = curr;
                    curr = next;
                    if curr == Duration::MAX {
                        break;
                    }
                }
                curr
            }
        }
    }
}

/// Extends `delay` by a uniformly random amount in `[0, max_jitter]`.
///
/// Jitter is only ever added, so the result is never shorter than `delay`.
pub fn apply_jitter(delay: Duration, max_jitter: Duration) -> Duration {
    if max_jitter.is_zero() {
        return delay;
    }
    let max_nanos = u64::try_from(max_jitter.as_nanos()).unwrap_or(u64::MAX);
    let extra = rand::rng().random_range(0..=max_nanos);
    delay.saturating_add(Duration::from_nanos(extra))
}
