use async_std::channel::{self, Receiver, Sender};
use async_std::future::timeout;
use futures::future::{Either, select};
use log::debug;
use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::time::{Duration, Instant};

/// The owning half of a one-shot, broadcast cancellation signal.
///
/// A signal starts *armed*. Calling [`fire`](CancellationSignal::fire) moves it to *fired*;
/// the transition is irreversible and every [`CancellationToken`] handed out by
/// [`token`](CancellationSignal::token) observes it without further synchronization.
///
/// Dropping the signal does not fire it.
///
/// # Examples
/// ```
/// use resilient_pipes::CancellationSignal;
///
/// let signal = CancellationSignal::new();
/// let token = signal.token();
/// assert!(!token.is_fired());
///
/// assert!(signal.fire());
/// assert!(!signal.fire()); // already fired
/// assert!(token.is_fired());
/// ```
pub struct CancellationSignal {
    token: CancellationToken,
}

impl CancellationSignal {
    /// Creates a new, armed signal.
    pub fn new() -> Self {
        // Every token keeps a sender alive, so the channel is only ever closed by `fire`.
        let (tx, rx) = channel::bounded(1);
        CancellationSignal {
            token: CancellationToken { tx, rx },
        }
    }

    /// Returns an observer of this signal.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fires the signal, waking every task currently waiting on it.
    ///
    /// Returns `true` if this call fired the signal and `false` if it had already been fired.
    pub fn fire(&self) -> bool {
        let fired = self.token.tx.close();
        if fired {
            debug!("Cancellation signal fired");
        }
        fired
    }

    /// Returns `true` once the signal has been fired.
    pub fn is_fired(&self) -> bool {
        self.token.is_fired()
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("fired", &self.is_fired())
            .finish()
    }
}

/// A non-owning observer of a [`CancellationSignal`].
///
/// Tokens are cheap to clone and can be moved into background tasks.
#[derive(Clone)]
pub struct CancellationToken {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl CancellationToken {
    /// A token whose signal can never be fired.
    ///
    /// Useful for pipelines that are only ever ended by exhausting their input.
    pub fn never() -> Self {
        CancellationSignal::new().token()
    }

    /// Returns `true` once the signal has been fired.
    pub fn is_fired(&self) -> bool {
        self.rx.is_closed()
    }

    /// Resolves once the signal has been fired. Resolves immediately if it already was.
    pub async fn fired(&self) {
        // Nothing is ever sent, so `recv` only returns when the channel is closed.
        let _ = self.rx.recv().await;
    }

    /// Drives `fut` to completion unless the signal fires first.
    ///
    /// Returns `None` if the signal was already fired or fires before `fut` completes;
    /// `fut` is dropped in that case. Cancellation wins if both are ready at once.
    ///
    /// # Examples
    /// ```
    /// use async_std::task::block_on;
    /// use resilient_pipes::CancellationSignal;
    ///
    /// let signal = CancellationSignal::new();
    /// let token = signal.token();
    ///
    /// assert_eq!(block_on(token.race(async { 7 })), Some(7));
    /// signal.fire();
    /// assert_eq!(block_on(token.race(async { 7 })), None);
    /// ```
    pub async fn race<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_fired() {
            return None;
        }
        let fired = pin!(self.fired());
        let fut = pin!(fut);
        match select(fired, fut).await {
            Either::Left(_) => None,
            Either::Right((output, _)) => Some(output),
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("fired", &self.is_fired())
            .finish()
    }
}

/// The context handed to every wrapped operation: a cancellation token and an optional deadline.
///
/// A context is *done* once its token fires or its deadline passes. Decorators race every
/// wait they perform against it.
#[derive(Clone, Debug)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Creates a context observing `token`, without a deadline.
    pub fn new(token: CancellationToken) -> Self {
        Context {
            token,
            deadline: None,
        }
    }

    /// A context that is never done.
    pub fn background() -> Self {
        Self::new(CancellationToken::never())
    }

    /// Returns this context with its deadline set to `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns this context with a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now().checked_add(timeout);
        match deadline {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// The token this context observes.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The instant after which this context is done, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` if the token has fired or the deadline has passed.
    pub fn is_done(&self) -> bool {
        self.token.is_fired() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Drives `fut` to completion unless the context is done first.
    ///
    /// Returns `None` when the token fires or the deadline elapses before `fut` completes.
    pub async fn race<F: Future>(&self, fut: F) -> Option<F::Output> {
        match self.deadline {
            None => self.token.race(fut).await,
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return None;
                }
                timeout(remaining, self.token.race(fut)).await.ok().flatten()
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
