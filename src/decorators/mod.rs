use crate::cancel::Context;
use crate::error::ResilienceError;
use std::future::Future;
use std::sync::Arc;

mod breaker;
mod retry;
mod throttle;

pub use breaker::{CircuitBreaker, CircuitMode};
pub use retry::BoundedRetry;
pub use throttle::RateLimiter;

/// A fallible, cancellable call site.
///
/// Every decorator in this module wraps an `Operation` and is an `Operation` with the same
/// output and error types itself, so decorators compose by nesting:
///
/// ```
/// use std::time::Duration;
/// use async_std::task::block_on;
/// use resilient_pipes::Context;
/// use resilient_pipes::config::{CircuitBreakerConfig, RateLimiterConfig, RetryPolicy};
/// use resilient_pipes::decorators::{
///     BoundedRetry, CircuitBreaker, Operation, RateLimiter, from_fn,
/// };
///
/// let fetch = from_fn(|_ctx: Context| async { Ok::<_, String>("payload") });
/// let guarded = BoundedRetry::new(
///     CircuitBreaker::new(
///         RateLimiter::new(fetch, RateLimiterConfig::default()),
///         CircuitBreakerConfig::new(3),
///     ),
///     RetryPolicy::new(2, Duration::from_millis(10)),
/// );
///
/// let result = block_on(guarded.call(&Context::background()));
/// assert_eq!(result, Ok("payload"));
/// ```
pub trait Operation<T, E>: Send + Sync {
    /// Invokes the operation once.
    fn call(&self, ctx: &Context) -> impl Future<Output = Result<T, ResilienceError<E>>> + Send;
}

/// An [`Operation`] backed by a plain async function. See [`from_fn`].
#[derive(Clone)]
pub struct FnOperation<F> {
    f: F,
}

/// Adapts an async function into an [`Operation`].
///
/// The function receives a clone of the caller's [`Context`]. Its errors are reported as
/// [`ResilienceError::OperationFailed`].
pub fn from_fn<F>(f: F) -> FnOperation<F> {
    FnOperation { f }
}

impl<F, Fut, T, E> Operation<T, E> for FnOperation<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send,
{
    fn call(&self, ctx: &Context) -> impl Future<Output = Result<T, ResilienceError<E>>> + Send {
        let fut = (self.f)(ctx.clone());
        async move { fut.await.map_err(ResilienceError::OperationFailed) }
    }
}

impl<T, E, Op> Operation<T, E> for Arc<Op>
where
    Op: Operation<T, E>,
{
    fn call(&self, ctx: &Context) -> impl Future<Output = Result<T, ResilienceError<E>>> + Send {
        (**self).call(ctx)
    }
}
