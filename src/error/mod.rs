use thiserror::Error;

/// The outcome of a decorated call that did not succeed.
///
/// `E` is the error type of the wrapped operation. Its own failures are surfaced unchanged
/// as [`OperationFailed`](ResilienceError::OperationFailed); every other variant is produced
/// by a decorator without the operation having run to completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilienceError<E> {
    /// The circuit breaker is inside its backoff window; the operation was not attempted.
    #[error("service unreachable")]
    ServiceUnavailable,

    /// The wrapped operation reported a failure.
    #[error("operation failed: {0}")]
    OperationFailed(E),

    /// The cancellation signal fired, or the deadline elapsed, while waiting.
    #[error("operation cancelled")]
    Cancelled,

    /// The rate limiter's token bucket is empty; the operation was not attempted.
    #[error("too many calls")]
    RateLimited,
}

impl<E> ResilienceError<E> {
    /// Returns `true` for [`ResilienceError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResilienceError::Cancelled)
    }

    /// Returns the wrapped operation's own error, if that is what this is.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            ResilienceError::OperationFailed(err) => Some(err),
            _ => None,
        }
    }
}
