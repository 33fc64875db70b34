use super::Operation;
use crate::cancel::{CancellationToken, Context};
use crate::config::RateLimiterConfig;
use crate::error::ResilienceError;
use async_std::task::{self, sleep};
use log::{debug, warn};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct TokenBucket {
    tokens: u32,
    refill_started: bool,
}

fn lock(bucket: &Mutex<TokenBucket>) -> MutexGuard<'_, TokenBucket> {
    bucket.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Token bucket admission control.
///
/// The bucket starts full. Every admitted call consumes one token; when the bucket is empty
/// calls are rejected with [`ResilienceError::RateLimited`] without invoking the wrapped
/// operation. A background task, started by the first call, adds `refill_amount` tokens
/// every `refill_interval`, never exceeding `max`.
///
/// The refill task runs until the limiter's shutdown token fires or the limiter is dropped.
/// Calls and the refill task share the bucket through a mutex, so the token count never
/// leaves `0..=max`.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use async_std::task::block_on;
/// use resilient_pipes::{Context, ResilienceError};
/// use resilient_pipes::config::RateLimiterConfig;
/// use resilient_pipes::decorators::{Operation, RateLimiter, from_fn};
///
/// let ping = from_fn(|_ctx: Context| async { Ok::<_, String>("pong") });
/// let limiter = RateLimiter::new(ping, RateLimiterConfig::new(2, 2, Duration::from_secs(1)));
/// let ctx = Context::background();
///
/// block_on(async {
///     assert_eq!(limiter.call(&ctx).await, Ok("pong"));
///     assert_eq!(limiter.call(&ctx).await, Ok("pong"));
///     assert_eq!(limiter.call(&ctx).await, Err(ResilienceError::RateLimited));
/// });
/// ```
#[derive(Debug)]
pub struct RateLimiter<Op> {
    inner: Op,
    config: RateLimiterConfig,
    bucket: Arc<Mutex<TokenBucket>>,
    shutdown: CancellationToken,
}

impl<Op> RateLimiter<Op> {
    /// Wraps `inner` in a limiter whose refill task runs for as long as the limiter lives.
    pub fn new(inner: Op, config: RateLimiterConfig) -> Self {
        Self::with_shutdown(inner, config, CancellationToken::never())
    }

    /// Wraps `inner` in a limiter that shuts down once `shutdown` fires.
    ///
    /// After shutdown the refill task stops and every call is rejected with
    /// [`ResilienceError::Cancelled`].
    pub fn with_shutdown(inner: Op, config: RateLimiterConfig, shutdown: CancellationToken) -> Self {
        RateLimiter {
            inner,
            config,
            bucket: Arc::new(Mutex::new(TokenBucket {
                tokens: config.max,
                refill_started: false,
            })),
            shutdown,
        }
    }

    /// The configuration this limiter was built with.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Tokens currently left in the bucket.
    pub fn available_tokens(&self) -> u32 {
        lock(&self.bucket).tokens
    }

    /// Takes a token if one is available, starting the refill task on first use.
    fn try_acquire(&self) -> bool {
        let mut bucket = lock(&self.bucket);
        if !bucket.refill_started {
            bucket.refill_started = true;
            self.spawn_refill();
        }
        if bucket.tokens == 0 {
            return false;
        }
        bucket.tokens -= 1;
        true
    }

    fn spawn_refill(&self) {
        let bucket = Arc::downgrade(&self.bucket);
        let shutdown = self.shutdown.clone();
        let config = self.config;

        task::spawn(async move {
            debug!(
                "Token bucket refill started: +{} every {:?}",
                config.refill_amount, config.refill_interval
            );
            while shutdown.race(sleep(config.refill_interval)).await.is_some() {
                let Some(bucket) = bucket.upgrade() else {
                    break;
                };
                refill(&bucket, &config);
            }
            debug!("Token bucket refill stopped");
        });
    }
}

fn refill(bucket: &Mutex<TokenBucket>, config: &RateLimiterConfig) {
    let mut bucket = lock(bucket);
    bucket.tokens = bucket
        .tokens
        .saturating_add(config.refill_amount)
        .min(config.max);
}

impl<Op, T, E> Operation<T, E> for RateLimiter<Op>
where
    Op: Operation<T, E>,
    T: Send,
    E: Send,
{
    fn call(&self, ctx: &Context) -> impl Future<Output = Result<T, ResilienceError<E>>> + Send {
        async move {
            if ctx.is_done() || self.shutdown.is_fired() {
                return Err(ResilienceError::Cancelled);
            }
            if !self.try_acquire() {
                warn!("Rate limit of {} calls reached, rejecting call", self.config.max);
                return Err(ResilienceError::RateLimited);
            }
            self.inner.call(ctx).await
        }
    }
}
