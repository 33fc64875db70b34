use crate::strategies::RetryStrategy;
use std::time::Duration;

/// Configuration for retrying operations with [`BoundedRetry`](crate::decorators::BoundedRetry).
///
/// The operation is attempted once and then retried up to `max_retries` times, so the total
/// number of attempts is `max_retries + 1`.
#[derive(Debug, Clone)]
pub struct RetryPolicy<E> {
    /// The number of retries after the initial attempt.
    pub max_retries: usize,

    /// The base delay between two attempts.
    ///
    /// The actual wait depends on `strategy`; with the default `Fixed` strategy every retry
    /// waits exactly this long.
    pub delay: Duration,

    /// The strategy used to space out retries.
    pub strategy: RetryStrategy,

    /// An optional function deciding whether a failure of the wrapped operation is worth retrying.
    ///
    /// It is consulted for the operation's own errors only:
    /// - `true` if the operation should be retried.
    /// - `false` if the call should fail immediately with that error.
    ///
    /// If set to `None` (the default), every failure is retried up to `max_retries`.
    pub retry_condition: Option<fn(&E) -> bool>,

    /// Upper bound of the random jitter added to every wait. Zero disables jitter.
    pub max_jitter: Duration,
}

impl<E> Default for RetryPolicy<E> {
    /// The default policy retries 3 times, 2 seconds apart, without jitter or retry condition.
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            delay: Duration::from_secs(2),
            strategy: RetryStrategy::Fixed,
            retry_condition: None,
            max_jitter: Duration::ZERO,
        }
    }
}

impl<E> RetryPolicy<E> {
    /// Creates a policy with a fixed `delay` between at most `max_retries` retries.
    ///
    /// # Examples
    /// ```
    /// use std::time::Duration;
    /// use resilient_pipes::config::RetryPolicy;
    ///
    /// let policy: RetryPolicy<String> = RetryPolicy::new(2, Duration::from_millis(10));
    /// assert_eq!(policy.max_retries, 2);
    /// ```
    pub fn new(max_retries: usize, delay: Duration) -> Self {
        RetryPolicy {
            max_retries,
            delay,
            ..Default::default()
        }
    }

    /// Sets a custom retry condition and returns the modified `RetryPolicy`.
    ///
    /// # Examples
    /// ```
    /// use std::time::Duration;
    /// use resilient_pipes::config::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(3, Duration::from_secs(1))
    ///     .with_retry_condition(|e: &String| e.contains("transient"));
    /// assert!(policy.retry_condition.is_some());
    /// ```
    pub fn with_retry_condition(mut self, retry_condition: fn(&E) -> bool) -> Self {
        self.retry_condition = Some(retry_condition);
        self
    }

    /// Sets the retry strategy and returns the modified `RetryPolicy`.
    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the maximum jitter added to each wait and returns the modified `RetryPolicy`.
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns `true` if `err` may be retried under this policy.
    pub(crate) fn should_retry(&self, err: &E) -> bool {
        self.retry_condition.is_none_or(|f| f(err))
    }
}

/// Configuration for a [`CircuitBreaker`](crate::decorators::CircuitBreaker).
///
/// Once `failure_threshold` consecutive calls have failed, the breaker rejects calls for a
/// backoff window of `backoff_unit * 2^(d + 1)`, where `d` is the number of consecutive
/// failures beyond the threshold. With the default unit of one second the windows are
/// 2s, 4s, 8s, ...
///
/// # Example
/// ```
/// use std::time::Duration;
/// use resilient_pipes::config::CircuitBreakerConfig;
///
/// let config = CircuitBreakerConfig::new(3).with_backoff_unit(Duration::from_millis(100));
/// assert_eq!(config.failure_threshold, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub backoff_unit: Duration,
}

impl Default for CircuitBreakerConfig {
    /// Opens after 5 consecutive failures with one-second backoff units.
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a configuration that opens after `failure_threshold` consecutive failures.
    ///
    /// # Panics
    /// Panics if `failure_threshold` is zero. A zero threshold would put a freshly built
    /// breaker in backoff before it has seen a single failure.
    pub fn new(failure_threshold: u32) -> Self {
        Self::default().with_failure_threshold(failure_threshold)
    }

    /// Builder-style setter for `failure_threshold`.
    ///
    /// # Panics
    /// Panics if `threshold` is zero.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        assert!(threshold > 0, "failure_threshold must be greater than 0");
        self.failure_threshold = threshold;
        self
    }

    /// Builder-style setter for `backoff_unit`.
    ///
    /// # Panics
    /// Panics if `unit` is zero.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        assert!(unit > Duration::ZERO, "backoff_unit must be non-zero");
        self.backoff_unit = unit;
        self
    }

    /// The length of the backoff window once `failures` consecutive failures have been seen,
    /// or `None` while `failures` is below the threshold.
    ///
    /// Saturates at `Duration::MAX`.
    pub fn backoff_window(&self, failures: u32) -> Option<Duration> {
        let beyond = failures.checked_sub(self.failure_threshold)?;
        let factor = beyond
            .checked_add(1)
            .and_then(|exp| 2u32.checked_pow(exp))
            .unwrap_or(u32::MAX);
        Some(self.backoff_unit.saturating_mul(factor))
    }
}

/// Configuration for a [`RateLimiter`](crate::decorators::RateLimiter) token bucket.
///
/// The bucket starts full with `max` tokens, each call consumes one, and every
/// `refill_interval` the bucket regains `refill_amount` tokens, never exceeding `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub max: u32,
    pub refill_amount: u32,
    pub refill_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max: 10,
            refill_amount: 10,
            refill_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    /// Creates a new `RateLimiterConfig`.
    ///
    /// # Panics
    /// Panics if `refill_interval` is zero.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use resilient_pipes::config::RateLimiterConfig;
    ///
    /// let config = RateLimiterConfig::new(5, 5, Duration::from_millis(100));
    /// assert_eq!(config.max, 5);
    /// ```
    pub fn new(max: u32, refill_amount: u32, refill_interval: Duration) -> Self {
        assert!(
            refill_interval > Duration::ZERO,
            "refill_interval must be non-zero"
        );
        Self {
            max,
            refill_amount,
            refill_interval,
        }
    }
}
