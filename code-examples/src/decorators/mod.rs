use async_std::task::sleep;
use rand::{Rng, rng};
use std::time::Duration;

use resilient_pipes::config::{CircuitBreakerConfig, RateLimiterConfig, RetryPolicy};
use resilient_pipes::decorators::{
    BoundedRetry, CircuitBreaker, Operation, RateLimiter, from_fn,
};
use resilient_pipes::{CancellationSignal, Context};

async fn dangerous_call(_ctx: Context) -> Result<u32, String> {
    sleep(Duration::from_millis(20)).await;
    if rng().random_range(0..3) == 0 {
        return Ok(200);
    }
    Err("connection reset".to_string())
}

// Example 4: Circuit Breaker
pub async fn example_circuit_breaker() {
    let config = CircuitBreakerConfig::new(2).with_backoff_unit(Duration::from_millis(50));
    let breaker = CircuitBreaker::new(from_fn(dangerous_call), config);
    let ctx = Context::background();

    for n in 1..10 {
        match breaker.call(&ctx).await {
            Ok(status) => println!("Call {} succeeded with {}", n, status),
            Err(e) => println!("Call {} failed: {}", n, e),
        }
        sleep(Duration::from_millis(40)).await;
    }
}

// Example 5: Rate limiter with a background refill
pub async fn example_rate_limiter() {
    let shutdown = CancellationSignal::new();
    let limiter = RateLimiter::with_shutdown(
        from_fn(|_ctx: Context| async { Ok::<_, String>("ok") }),
        RateLimiterConfig::new(3, 1, Duration::from_millis(100)),
        shutdown.token(),
    );
    let ctx = Context::background();

    for n in 1..=6 {
        match limiter.call(&ctx).await {
            Ok(value) => println!("Request {}: {}", n, value),
            Err(e) => println!("Request {}: {}", n, e),
        }
        sleep(Duration::from_millis(30)).await;
    }
    shutdown.fire();
}

// Example 6: Decorators nest, the outermost runs first
pub async fn example_guarded_call() {
    let guarded = BoundedRetry::new(
        CircuitBreaker::new(
            RateLimiter::new(from_fn(dangerous_call), RateLimiterConfig::default()),
            CircuitBreakerConfig::new(3),
        ),
        RetryPolicy::new(4, Duration::from_millis(50)).with_jitter(Duration::from_millis(20)),
    );
    let ctx = Context::background().with_timeout(Duration::from_secs(2));

    match guarded.call(&ctx).await {
        Ok(status) => println!("Guarded call succeeded with {}", status),
        Err(e) => println!("Guarded call gave up: {}", e),
    }
}
