use crate::cancel::CancellationToken;
use async_std::channel::{self, Receiver, Sender};
use async_std::task::{self, JoinHandle};
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use log::{debug, trace};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// A pipe queues at most this many values. A sender then still waits until its value has
/// been taken, so a producer never runs more than one value ahead of its consumer.
const HANDOFF_CAPACITY: usize = 1;

/// A value on its way through a pipe, with the acknowledgement fired once it is taken.
struct Handoff<T> {
    value: T,
    taken: oneshot::Sender<()>,
}

enum Source<T> {
    /// Fed by a [`SequenceSender`].
    Pipe(Receiver<Handoff<T>>),
    /// A plain channel owned by the caller.
    Channel(Receiver<T>),
    /// Never yields a value.
    Idle,
}

/// The output of every pipeline stage: an ordered, possibly infinite sequence of values that
/// ends when its producer is exhausted or its cancellation signal fires.
///
/// Once the signal has fired the sequence yields `None`, even if its producer had already
/// handed over a value that nobody has read yet. That value is dropped. A consumer waiting
/// in `next` is woken by the signal itself, whatever feeds the sequence.
///
/// `Sequence` implements [`Stream`], so it can be consumed with [`StreamExt`] and plugged in
/// as the input of another stage.
pub struct Sequence<T> {
    source: Source<T>,
    token: CancellationToken,
    fired: BoxFuture<'static, ()>,
}

impl<T> Sequence<T> {
    /// Wraps the receiving end of a caller-owned channel so that it stops yielding once
    /// `token` fires.
    pub fn new(rx: Receiver<T>, token: CancellationToken) -> Self {
        Self::with_source(Source::Channel(rx), token)
    }

    fn idle(token: &CancellationToken) -> Self {
        Self::with_source(Source::Idle, token.clone())
    }

    fn with_source(source: Source<T>, token: CancellationToken) -> Self {
        let fired = {
            let token = token.clone();
            async move { token.fired().await }.boxed()
        };
        Sequence {
            source,
            token,
            fired,
        }
    }
}

impl<T> Stream for Sequence<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        // `fired` must not be polled again once it has completed.
        if this.token.is_fired() || this.fired.poll_unpin(cx).is_ready() {
            return Poll::Ready(None);
        }
        let next = match &mut this.source {
            Source::Pipe(rx) => ready!(rx.poll_next_unpin(cx)).map(|handoff| {
                let _ = handoff.taken.send(());
                handoff.value
            }),
            Source::Channel(rx) => ready!(rx.poll_next_unpin(cx)),
            Source::Idle => return Poll::Pending,
        };
        // Lost the race against the signal.
        if next.is_some() && this.token.is_fired() {
            return Poll::Ready(None);
        }
        Poll::Ready(next)
    }
}

impl<T> Drop for Sequence<T> {
    fn drop(&mut self) {
        // Queued handoffs outlive the receiver while a sender is alive; drop them so their
        // senders stop waiting.
        if let Source::Pipe(rx) = &self.source {
            rx.close();
            while rx.try_recv().is_ok() {}
        }
    }
}

/// The sending half of a pipe. See [`pipe`].
pub struct SequenceSender<T> {
    tx: Sender<Handoff<T>>,
}

impl<T> SequenceSender<T> {
    /// Hands `value` to the consumer and waits until it has been taken.
    ///
    /// Returns `false` if the consumer went away before taking it.
    pub async fn send(&self, value: T) -> bool {
        let (taken, ack) = oneshot::channel();
        if self.tx.send(Handoff { value, taken }).await.is_err() {
            return false;
        }
        ack.await.is_ok()
    }

    /// Returns `true` once the consumer is gone or the pipe has been closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Ends the sequence. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.tx.close()
    }
}

/// Creates an unbuffered pipe: every [`SequenceSender::send`] completes only once the
/// returned [`Sequence`] has yielded the value.
///
/// # Examples
/// ```
/// use async_std::task::block_on;
/// use futures::StreamExt;
/// use resilient_pipes::CancellationToken;
/// use resilient_pipes::streams::pipe;
///
/// let (tx, mut rx) = pipe(&CancellationToken::never());
/// block_on(async {
///     let (sent, received) = futures::join!(tx.send("hello"), rx.next());
///     assert!(sent);
///     assert_eq!(received, Some("hello"));
/// });
/// ```
pub fn pipe<T>(token: &CancellationToken) -> (SequenceSender<T>, Sequence<T>) {
    let (tx, rx) = channel::bounded(HANDOFF_CAPACITY);
    (
        SequenceSender { tx },
        Sequence::with_source(Source::Pipe(rx), token.clone()),
    )
}

/// Hands `value` to `tx`, giving up if the signal fires first or the consumer is gone.
async fn forward<T>(token: &CancellationToken, tx: &SequenceSender<T>, value: T) -> bool {
    token.race(tx.send(value)).await == Some(true)
}

/// Relays every value of `input`, in order, until `input` is exhausted or `token` fires.
///
/// The relay runs as a background task. Every wait, on `input` as well as on the consumer,
/// is raced against the signal, so the task never outlives a fired signal for long.
///
/// # Examples
/// ```
/// use async_std::task::block_on;
/// use futures::stream::{self, StreamExt};
/// use resilient_pipes::CancellationSignal;
/// use resilient_pipes::streams::filter_on_cancel;
///
/// let signal = CancellationSignal::new();
/// let mut values = filter_on_cancel(&signal.token(), stream::iter(0..10));
///
/// block_on(async {
///     assert_eq!(values.next().await, Some(0));
///     assert_eq!(values.next().await, Some(1));
///     signal.fire();
///     assert_eq!(values.next().await, None);
/// });
/// ```
pub fn filter_on_cancel<T, S>(token: &CancellationToken, input: S) -> Sequence<T>
where
    T: Send + 'static,
    S: Stream<Item = T> + Unpin + Send + 'static,
{
    let (tx, output) = pipe(token);
    let token = token.clone();
    task::spawn(async move {
        let mut input = input;
        while let Some(Some(value)) = token.race(input.next()).await {
            if !forward(&token, &tx, value).await {
                break;
            }
        }
        trace!("filter_on_cancel relay finished");
    });
    output
}

/// Flattens a stream of streams into a single sequence.
///
/// Inner streams are consumed one at a time: each is fully drained, in order, before the next
/// one is taken from `streams`. Ends when `streams` is exhausted or `token` fires.
pub fn flatten<T, S, I>(token: &CancellationToken, streams: S) -> Sequence<T>
where
    T: Send + 'static,
    I: Stream<Item = T> + Unpin + Send + 'static,
    S: Stream<Item = I> + Unpin + Send + 'static,
{
    let (tx, output) = pipe(token);
    let token = token.clone();
    task::spawn(async move {
        let mut streams = streams;
        'outer: while let Some(Some(mut inner)) = token.race(streams.next()).await {
            while let Some(Some(value)) = token.race(inner.next()).await {
                if !forward(&token, &tx, value).await {
                    break 'outer;
                }
            }
        }
        trace!("flatten finished");
    });
    output
}

/// Delivers one value to every sink.
///
/// Sinks are served concurrently: a slow sink does not hold up delivery to the others, and the
/// call returns once every open sink has taken the value. Sinks whose consumers are gone are
/// skipped. Returns `false` if `token` fired before delivery completed.
pub async fn fanout_value<T>(
    token: &CancellationToken,
    value: T,
    sinks: &[SequenceSender<T>],
) -> bool
where
    T: Clone,
{
    let mut pending: FuturesUnordered<_> = sinks
        .iter()
        .filter(|sink| !sink.is_closed())
        .map(|sink| sink.send(value.clone()))
        .collect();

    loop {
        match token.race(pending.next()).await {
            None => return false,
            Some(None) => return true,
            Some(Some(true)) => {}
            Some(Some(false)) => debug!("Fanout sink dropped by its consumer, skipping it"),
        }
    }
}

/// Duplicates `input` into every one of `sinks`.
///
/// Each value is taken by all sinks before the next one is read from `input`, which keeps
/// the fastest sink at most one value ahead of the slowest. Every sink is closed once `input`
/// is exhausted or `token` fires.
///
/// Returns the handle of the background task; dropping it does not stop the fanout.
pub fn fanout<T, S>(
    token: &CancellationToken,
    input: S,
    sinks: Vec<SequenceSender<T>>,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    S: Stream<Item = T> + Unpin + Send + 'static,
{
    let token = token.clone();
    task::spawn(async move {
        let mut input = input;
        while let Some(Some(value)) = token.race(input.next()).await {
            if !fanout_value(&token, value, &sinks).await {
                break;
            }
        }
        for sink in &sinks {
            sink.close();
        }
        debug!("Fanout finished, closed {} sinks", sinks.len());
    })
}

/// Like [`fanout`], but creates the `n` sinks itself and returns their sequences.
pub fn fanout_n<T, S>(token: &CancellationToken, input: S, n: usize) -> Vec<Sequence<T>>
where
    T: Clone + Send + 'static,
    S: Stream<Item = T> + Unpin + Send + 'static,
{
    let (sinks, outputs): (Vec<_>, Vec<_>) = (0..n).map(|_| pipe(token)).unzip();
    fanout(token, input, sinks);
    outputs
}

/// Splits `input` into two sequences that both observe every value.
pub fn tee<T, S>(token: &CancellationToken, input: S) -> (Sequence<T>, Sequence<T>)
where
    T: Clone + Send + 'static,
    S: Stream<Item = T> + Unpin + Send + 'static,
{
    let (first_tx, first) = pipe(token);
    let (second_tx, second) = pipe(token);
    fanout(token, input, vec![first_tx, second_tx]);
    (first, second)
}

/// Takes at most the first `num` values of `input`.
///
/// Yields fewer if `input` is exhausted or `token` fires first. Upstream is released as soon
/// as `num` values have been taken.
pub fn bounded<T, S>(token: &CancellationToken, input: S, num: usize) -> Sequence<T>
where
    T: Send + 'static,
    S: Stream<Item = T> + Unpin + Send + 'static,
{
    let (tx, output) = pipe(token);
    let token = token.clone();
    task::spawn(async move {
        let mut input = input;
        for _ in 0..num {
            let Some(Some(value)) = token.race(input.next()).await else {
                break;
            };
            if !forward(&token, &tx, value).await {
                break;
            }
        }
    });
    output
}

/// Replays `values` in order, over and over, until `token` fires.
///
/// An empty `values` produces nothing and the sequence ends only once `token` fires.
///
/// # Examples
/// ```
/// use async_std::task::block_on;
/// use futures::StreamExt;
/// use resilient_pipes::CancellationToken;
/// use resilient_pipes::streams::{bounded, cycle};
///
/// let token = CancellationToken::never();
/// let values = bounded(&token, cycle(&token, vec!['a', 'b']), 5);
/// let values: Vec<char> = block_on(values.collect());
/// assert_eq!(values, vec!['a', 'b', 'a', 'b', 'a']);
/// ```
pub fn cycle<T>(token: &CancellationToken, values: Vec<T>) -> Sequence<T>
where
    T: Clone + Send + 'static,
{
    if values.is_empty() {
        return Sequence::idle(token);
    }
    let (tx, output) = pipe(token);
    let token = token.clone();
    task::spawn(async move {
        let mut next = 0;
        loop {
            let value = values[next].clone();
            next = (next + 1) % values.len();
            if !forward(&token, &tx, value).await {
                break;
            }
        }
        trace!("cycle finished");
    });
    output
}
