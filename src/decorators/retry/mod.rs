use super::Operation;
use crate::cancel::Context;
use crate::config::RetryPolicy;
use crate::error::ResilienceError;
use crate::strategies::apply_jitter;
use async_std::task::sleep;
use log::{info, warn};
use std::future::Future;

/// Re-attempts a failing operation a bounded number of times.
///
/// The operation is attempted once; while it fails and fewer than `max_retries` retries have
/// been made, the decorator waits (see [`RetryPolicy`]) and tries again, so at most
/// `max_retries + 1` attempts are made. The result of the last attempt is returned unchanged.
///
/// Every wait is raced against the caller's [`Context`]: if it is cancelled or its deadline
/// elapses first, the call ends at once with [`ResilienceError::Cancelled`]. A `Cancelled`
/// result of the wrapped operation is never retried.
///
/// # Example
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
/// use async_std::task::block_on;
/// use resilient_pipes::Context;
/// use resilient_pipes::config::RetryPolicy;
/// use resilient_pipes::decorators::{BoundedRetry, Operation, from_fn};
///
/// let attempts = AtomicUsize::new(0);
/// let flaky = from_fn(|_ctx: Context| {
///     let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
///     async move {
///         if attempt < 3 { Err("temporary failure") } else { Ok(attempt) }
///     }
/// });
///
/// let retry = BoundedRetry::new(flaky, RetryPolicy::new(2, Duration::from_millis(10)));
/// assert_eq!(block_on(retry.call(&Context::background())), Ok(3));
/// ```
#[derive(Debug)]
pub struct BoundedRetry<Op, E> {
    inner: Op,
    policy: RetryPolicy<E>,
}

impl<Op, E> BoundedRetry<Op, E> {
    /// Wraps `inner`, retrying it as `policy` describes.
    pub fn new(inner: Op, policy: RetryPolicy<E>) -> Self {
        BoundedRetry { inner, policy }
    }

    /// The policy this decorator retries with.
    pub fn policy(&self) -> &RetryPolicy<E> {
        &self.policy
    }

    fn is_retryable(&self, err: &ResilienceError<E>) -> bool {
        match err {
            ResilienceError::Cancelled => false,
            ResilienceError::OperationFailed(err) => self.policy.should_retry(err),
            ResilienceError::ServiceUnavailable | ResilienceError::RateLimited => true,
        }
    }
}

impl<Op, T, E> Operation<T, E> for BoundedRetry<Op, E>
where
    Op: Operation<T, E>,
    T: Send,
    E: Send,
{
    fn call(&self, ctx: &Context) -> impl Future<Output = Result<T, ResilienceError<E>>> + Send {
        async move {
            let mut retries = 0;

            loop {
                let err = match self.inner.call(ctx).await {
                    Ok(output) => {
                        if retries > 0 {
                            info!("Operation succeeded after {} attempts", retries + 1);
                        }
                        return Ok(output);
                    }
                    Err(err) => err,
                };

                if !self.is_retryable(&err) {
                    warn!(
                        "Operation failed (attempt {}/{}), not retryable, giving up.",
                        retries + 1,
                        self.policy.max_retries + 1
                    );
                    return Err(err);
                }
                if retries >= self.policy.max_retries {
                    warn!("Operation failed after {} attempts, giving up.", retries + 1);
                    return Err(err);
                }
                drop(err);

                retries += 1;
                let delay = apply_jitter(
                    self.policy.strategy.calculate_delay(self.policy.delay, retries),
                    self.policy.max_jitter,
                );
                warn!("Attempt {} failed; retrying in {:?}", retries, delay);

                if ctx.race(sleep(delay)).await.is_none() {
                    warn!("Retry abandoned, context done while waiting");
                    return Err(ResilienceError::Cancelled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationSignal;
    use crate::decorators::from_fn;
    use crate::decorators::test_support::scripted;
    use crate::strategies::RetryStrategy;
    use async_std::task::{block_on, spawn};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn policy(max_retries: usize, delay: Duration) -> RetryPolicy<String> {
        RetryPolicy::new(max_retries, delay)
    }

    mod outcome_tests {
        use super::*;

        #[test]
        fn test_success_first_try() {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = BoundedRetry::new(
                scripted(vec![true], calls.clone()),
                policy(3, Duration::from_millis(10)),
            );

            let result = block_on(retry.call(&Context::background()));
            assert_eq!(result, Ok(1));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn test_success_on_third_attempt_waits_between_attempts() {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = BoundedRetry::new(
                scripted(vec![false, false, true], calls.clone()),
                policy(2, Duration::from_millis(10)),
            );

            let start = Instant::now();
            let result = block_on(retry.call(&Context::background()));

            assert_eq!(result, Ok(3));
            assert_eq!(calls.load(Ordering::SeqCst), 3);
            assert!(start.elapsed() >= Duration::from_millis(20));
        }

        #[test]
        fn test_returns_last_error_when_exhausted() {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = BoundedRetry::new(
                scripted(vec![], calls.clone()),
                policy(2, Duration::from_millis(1)),
            );

            let result = block_on(retry.call(&Context::background()));
            assert_eq!(
                result,
                Err(ResilienceError::OperationFailed("failure 3".to_string()))
            );
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        }

        #[test]
        fn test_zero_retries_attempts_once() {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = BoundedRetry::new(
                scripted(vec![], calls.clone()),
                policy(0, Duration::from_millis(1)),
            );

            assert!(block_on(retry.call(&Context::background())).is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    mod condition_tests {
        use super::*;

        #[test]
        fn test_condition_mismatch_gives_up_immediately() {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = BoundedRetry::new(
                scripted(vec![false, true], calls.clone()),
                policy(3, Duration::from_millis(1))
                    .with_retry_condition(|e: &String| e.contains("transient")),
            );

            let result = block_on(retry.call(&Context::background()));
            assert_eq!(
                result,
                Err(ResilienceError::OperationFailed("failure 1".to_string()))
            );
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        #[test]
        fn test_condition_match_retries() {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = BoundedRetry::new(
                scripted(vec![false, true], calls.clone()),
                policy(3, Duration::from_millis(1))
                    .with_retry_condition(|e: &String| e.starts_with("failure")),
            );

            assert_eq!(block_on(retry.call(&Context::background())), Ok(2));
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        }

        #[test]
        fn test_cancelled_result_is_not_retried() {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = BoundedRetry::new(
                AlwaysCancelled(calls.clone()),
                policy(3, Duration::from_millis(1)),
            );

            let result = block_on(retry.call(&Context::background()));
            assert_eq!(result, Err(ResilienceError::Cancelled));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        struct AlwaysCancelled(Arc<AtomicUsize>);

        impl Operation<(), String> for AlwaysCancelled {
            fn call(
                &self,
                _ctx: &Context,
            ) -> impl Future<Output = Result<(), ResilienceError<String>>> + Send {
                self.0.fetch_add(1, Ordering::SeqCst);
                async { Err(ResilienceError::Cancelled) }
            }
        }
    }

    mod cancellation_tests {
        use super::*;

        #[test]
        fn test_cancel_during_wait_aborts() {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = BoundedRetry::new(
                scripted(vec![], calls.clone()),
                policy(3, Duration::from_secs(5)),
            );
            let signal = CancellationSignal::new();
            let ctx = Context::new(signal.token());

            let start = Instant::now();
            let result = block_on(async {
                let firing = spawn(async move {
                    async_std::task::sleep(Duration::from_millis(20)).await;
                    signal.fire();
                });
                let result = retry.call(&ctx).await;
                firing.await;
                result
            });

            assert_eq!(result, Err(ResilienceError::Cancelled));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert!(start.elapsed() < Duration::from_secs(1));
        }

        #[test]
        fn test_deadline_during_wait_aborts() {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = BoundedRetry::new(
                scripted(vec![], calls.clone()),
                policy(3, Duration::from_secs(5)),
            );
            let ctx = Context::background().with_timeout(Duration::from_millis(30));

            let start = Instant::now();
            assert_eq!(
                block_on(retry.call(&ctx)),
                Err(ResilienceError::Cancelled)
            );
            assert!(start.elapsed() < Duration::from_secs(1));
        }
    }

    mod strategy_tests {
        use super::*;

        #[test]
        fn test_exponential_strategy_spaces_retries() {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = BoundedRetry::new(
                scripted(vec![], calls.clone()),
                policy(2, Duration::from_millis(10))
                    .with_strategy(RetryStrategy::ExponentialBackoff),
            );

            let start = Instant::now();
            assert!(block_on(retry.call(&Context::background())).is_err());
            // 10ms, then 20ms.
            assert!(start.elapsed() >= Duration::from_millis(30));
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        }

        #[test]
        fn test_jitter_never_shortens_wait() {
            let calls = Arc::new(AtomicUsize::new(0));
            let retry = BoundedRetry::new(
                scripted(vec![false, true], calls.clone()),
                policy(1, Duration::from_millis(15)).with_jitter(Duration::from_millis(5)),
            );

            let start = Instant::now();
            assert_eq!(block_on(retry.call(&Context::background())), Ok(2));
            assert!(start.elapsed() >= Duration::from_millis(15));
        }

        #[test]
        fn test_slow_operation_keeps_its_result() {
            let retry = BoundedRetry::new(
                from_fn(|_ctx: Context| async {
                    async_std::task::sleep(Duration::from_millis(5)).await;
                    Ok::<_, String>("slow")
                }),
                policy(1, Duration::from_millis(1)),
            );
            assert_eq!(block_on(retry.call(&Context::background())), Ok("slow"));
        }
    }
}
