use super::Operation;
use crate::cancel::Context;
use crate::config::CircuitBreakerConfig;
use crate::error::ResilienceError;
use log::{debug, error, warn};
use std::future::Future;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// The two effective modes of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitMode {
    /// Calls are passed through to the wrapped operation.
    Closed,
    /// Calls are rejected with [`ResilienceError::ServiceUnavailable`] until the backoff
    /// window elapses.
    Backoff,
}

#[derive(Debug)]
struct CircuitState {
    consecutive_failures: u32,
    last_attempt: Instant,
}

/// A circuit breaker that stops hammering a dependency after sustained failure.
///
/// The breaker counts consecutive failed calls. Once the count reaches the configured
/// threshold it rejects calls, without invoking the wrapped operation, until a backoff window
/// measured from the last attempt has elapsed. The window doubles with every failure beyond
/// the threshold (see [`CircuitBreakerConfig::backoff_window`]). There is no half-open
/// probing: once the window elapses the next call goes through, and a single success closes
/// the breaker again.
///
/// # Concurrency
/// The backoff check only takes a read lock, which is released before the wrapped operation
/// runs; the outcome is recorded afterwards under the write lock. Several callers can
/// therefore observe "not in backoff" at the same moment and all invoke the operation. The
/// breaker limits sustained failure, not instantaneous concurrency. No update is lost.
#[derive(Debug)]
pub struct CircuitBreaker<Op> {
    inner: Op,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
}

impl<Op> CircuitBreaker<Op> {
    /// Wraps `inner` in a closed circuit breaker.
    ///
    /// # Examples
    /// ```rust
    /// use async_std::task::block_on;
    /// use resilient_pipes::{Context, ResilienceError};
    /// use resilient_pipes::config::CircuitBreakerConfig;
    /// use resilient_pipes::decorators::{CircuitBreaker, CircuitMode, Operation, from_fn};
    ///
    /// let flaky = from_fn(|_ctx: Context| async { Err::<(), _>("connection refused") });
    /// let breaker = CircuitBreaker::new(flaky, CircuitBreakerConfig::new(2));
    /// let ctx = Context::background();
    ///
    /// block_on(async {
    ///     for _ in 0..2 {
    ///         let err = breaker.call(&ctx).await.unwrap_err();
    ///         assert_eq!(err, ResilienceError::OperationFailed("connection refused"));
    ///     }
    ///     assert_eq!(breaker.mode(), CircuitMode::Backoff);
    ///     assert_eq!(breaker.call(&ctx).await, Err(ResilienceError::ServiceUnavailable));
    /// });
    /// ```
    pub fn new(inner: Op, config: CircuitBreakerConfig) -> Self {
        CircuitBreaker {
            inner,
            config,
            state: RwLock::new(CircuitState {
                consecutive_failures: 0,
                last_attempt: Instant::now(),
            }),
        }
    }

    /// The configuration this breaker was built with.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Failed calls since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.read_state().consecutive_failures
    }

    /// Returns whether a call made right now would be let through.
    pub fn mode(&self) -> CircuitMode {
        match self.backoff_remaining(Instant::now()) {
            Some(_) => CircuitMode::Backoff,
            None => CircuitMode::Closed,
        }
    }

    // Every critical section leaves the state consistent, so a poisoned lock is still usable.
    fn read_state(&self) -> RwLockReadGuard<'_, CircuitState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CircuitState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// How much of the backoff window is left at `now`, or `None` if calls may proceed.
    fn backoff_remaining(&self, now: Instant) -> Option<Duration> {
        let state = self.read_state();
        let window = self.config.backoff_window(state.consecutive_failures)?;
        match state.last_attempt.checked_add(window) {
            Some(retry_at) if now > retry_at => None,
            Some(retry_at) => Some(retry_at - now),
            None => Some(Duration::MAX),
        }
    }

    fn record(&self, succeeded: bool) {
        let mut state = self.write_state();
        state.last_attempt = Instant::now();

        if succeeded {
            if state.consecutive_failures > 0 {
                debug!(
                    "Circuit breaker closed after {} consecutive failures",
                    state.consecutive_failures
                );
            }
            state.consecutive_failures = 0;
            return;
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if let Some(window) = self.config.backoff_window(state.consecutive_failures) {
            error!(
                "Circuit breaker backing off for {:?} after {} consecutive failures",
                window, state.consecutive_failures
            );
        } else {
            debug!(
                "Call failed ({}/{} consecutive failures)",
                state.consecutive_failures, self.config.failure_threshold
            );
        }
    }
}

impl<Op, T, E> Operation<T, E> for CircuitBreaker<Op>
where
    Op: Operation<T, E>,
    T: Send,
    E: Send,
{
    fn call(&self, ctx: &Context) -> impl Future<Output = Result<T, ResilienceError<E>>> + Send {
        async move {
            if let Some(remaining) = self.backoff_remaining(Instant::now()) {
                warn!(
                    "Circuit breaker in backoff for another {:?}, rejecting call",
                    remaining
                );
                return Err(ResilienceError::ServiceUnavailable);
            }

            let result = self.inner.call(ctx).await;
            self.record(result.is_ok());
            result
        }
    }
}
