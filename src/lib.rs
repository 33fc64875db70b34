/// The `cancel` module provides the broadcast "stop now" signal shared by every
/// pipeline stage and decorated call, together with the `Context` handed to
/// wrapped operations.
pub mod cancel;

/// The `config` module provides configuration structures for the resilience
/// decorators. This includes settings like the failure threshold of a circuit
/// breaker, the retry bound and delay, and the token bucket sizing.
pub mod config;

/// The `decorators` module wraps a fallible, cancellable operation to make
/// repeated invocation safer: circuit breaking, bounded retry and rate limiting.
/// Decorators are operations themselves, so they compose by nesting.
pub mod decorators;

/// The `error` module defines the error kinds a decorated call can report.
pub mod error;

/// The `strategies` module defines how the delay between retry attempts is
/// calculated, supporting fixed, exponential and Fibonacci spacing with optional jitter.
pub mod strategies;

/// The `streams` module provides pipeline stages that each run as an independent
/// background task, pulling from upstream and pushing downstream, and stop as soon
/// as their cancellation signal fires.
pub mod streams;

pub use cancel::{CancellationSignal, CancellationToken, Context};
pub use error::ResilienceError;
