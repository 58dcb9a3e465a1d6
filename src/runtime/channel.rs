//! Bounded, ordered channels between blocks
//!
//! A channel has exactly one [`Sender`] (the producing block) and any number of
//! [`Receiver`]s. Fan-out is broadcast by duplication: every receiver owns its own
//! bounded FIFO and `put` clones the item into each of them, so a slow reader only
//! backpressures the producer and never steals items from its siblings.
//!
//! Closing is done by dropping the underlying crossbeam senders. Receivers drain
//! whatever is still buffered and then report exhaustion.

use super::receiver::Receiver;
use super::sender::Sender;
use super::signal::Signal;
use crossbeam_channel::bounded;
use std::time::Duration;

/// Integer identifier of a channel, unique within a pipeline
pub type ChannelKey = usize;

/// How often blocked operations wake up to check for an abort
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of a non-blocking read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryGet<T> {
    Item(T),
    /// Nothing buffered yet, but the producer may still send
    Empty,
    /// Closed and drained
    Exhausted,
}

/// Whether a receiver can serve a `get` without blocking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Pending,
    Exhausted,
}

/// Create a single-reader channel. A capacity of 0 is raised to 1.
pub fn channel<T: Clone>(key: ChannelKey, capacity: usize) -> (Sender<T>, Receiver<T>) {
    let (tx, mut rxs) = broadcast(key, capacity, 1);
    let rx = rxs.remove(0);
    (tx, rx)
}

/// Create a channel with `readers` independent receivers.
///
/// With zero readers the sender accepts and drops every item.
pub fn broadcast<T: Clone>(
    key: ChannelKey,
    capacity: usize,
    readers: usize,
) -> (Sender<T>, Vec<Receiver<T>>) {
    wired(key, capacity, readers, Signal::new(), DEFAULT_POLL_INTERVAL)
}

/// Create a channel whose blocking operations give up once `abort` is raised.
pub(crate) fn wired<T: Clone>(
    key: ChannelKey,
    capacity: usize,
    readers: usize,
    abort: Signal,
    poll_interval: Duration,
) -> (Sender<T>, Vec<Receiver<T>>) {
    let capacity = capacity.max(1);
    let mut destinations = Vec::with_capacity(readers);
    let mut receivers = Vec::with_capacity(readers);
    for _ in 0..readers {
        let (tx, rx) = bounded(capacity);
        destinations.push(tx);
        receivers.push(Receiver::new(key, rx, abort.clone(), poll_interval));
    }
    (
        Sender::new(key, destinations, abort, poll_interval),
        receivers,
    )
}
