//! Consumer endpoint of a channel with a putback buffer
//!
//! [`Receiver`] wraps one `crossbeam_channel::Receiver<T>` together with a small
//! putback buffer. The buffer lets the cooperative scheduler peek at an item to learn
//! that a block is runnable without losing it, and lets callers return an item to the
//! front of the stream. Exhaustion (producer closed, queue drained) is cached so every
//! later call answers immediately.

use crossbeam_channel::{Receiver as CrossbeamReceiver, RecvTimeoutError, TryRecvError};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use super::channel::{ChannelKey, Readiness, TryGet};
use super::errors::ChannelError;
use super::signal::Signal;
use super::watchdog::{OperationGuard, WatchdogHandle};

/// Receiving half of a channel
pub struct Receiver<T> {
    key: ChannelKey,
    receiver: CrossbeamReceiver<T>,
    buffer: VecDeque<T>,
    exhausted: bool,
    abort: Signal,
    poll_interval: Duration,
    watchdog_handle: Option<WatchdogHandle>,
}

impl<T> Receiver<T> {
    pub(crate) fn new(
        key: ChannelKey,
        receiver: CrossbeamReceiver<T>,
        abort: Signal,
        poll_interval: Duration,
    ) -> Self {
        Self {
            key,
            receiver,
            buffer: VecDeque::new(),
            exhausted: false,
            abort,
            poll_interval,
            watchdog_handle: None,
        }
    }

    pub(crate) fn with_watchdog(mut self, watchdog_handle: WatchdogHandle) -> Self {
        self.watchdog_handle = Some(watchdog_handle);
        self
    }

    pub fn key(&self) -> ChannelKey {
        self.key
    }

    /// Blocking receive of the oldest item.
    ///
    /// Returns `Ok(None)` once the producer has closed the channel and everything
    /// buffered has been read. Fails with [`ChannelError::Aborted`] if the pipeline
    /// aborts while waiting.
    pub fn get(&mut self) -> Result<Option<T>, ChannelError> {
        if let Some(item) = self.buffer.pop_front() {
            return Ok(Some(item));
        }
        if self.exhausted {
            return Ok(None);
        }

        let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);
        loop {
            match self.receiver.recv_timeout(self.poll_interval) {
                Ok(item) => return Ok(Some(item)),
                Err(RecvTimeoutError::Timeout) => {
                    if self.abort.is_raised() {
                        return Err(ChannelError::Aborted);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.exhausted = true;
                    debug!("Channel {} exhausted", self.key);
                    return Ok(None);
                }
            }
        }
    }

    /// Non-blocking receive
    pub fn try_get(&mut self) -> TryGet<T> {
        match self.poll_ready() {
            Readiness::Ready => match self.buffer.pop_front() {
                Some(item) => TryGet::Item(item),
                None => TryGet::Empty,
            },
            Readiness::Pending => TryGet::Empty,
            Readiness::Exhausted => TryGet::Exhausted,
        }
    }

    /// Report whether `get` would return without blocking, pulling at most one
    /// item into the putback buffer to find out.
    pub fn poll_ready(&mut self) -> Readiness {
        if !self.buffer.is_empty() {
            return Readiness::Ready;
        }
        if self.exhausted {
            return Readiness::Exhausted;
        }
        match self.receiver.try_recv() {
            Ok(item) => {
                self.buffer.push_back(item);
                Readiness::Ready
            }
            Err(TryRecvError::Empty) => Readiness::Pending,
            Err(TryRecvError::Disconnected) => {
                self.exhausted = true;
                debug!("Channel {} exhausted", self.key);
                Readiness::Exhausted
            }
        }
    }

    /// Return an item to the front so the next `get` yields it
    pub fn put_back(&mut self, item: T) {
        self.buffer.push_front(item);
    }

    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// True once the producer closed the channel and the queue ran dry.
    /// Items may still sit in the putback buffer.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Discard everything currently readable without blocking. Returns the count.
    pub fn drain(&mut self) -> usize {
        let buffered = self.buffer.len();
        self.buffer.clear();
        buffered + self.receiver.try_iter().count()
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("key", &self.key)
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::channel::{Readiness, TryGet, channel, wired};
    use crate::runtime::errors::ChannelError;
    use crate::runtime::signal::Signal;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_get_from_buffer_then_channel() {
        let (mut tx, mut rx) = channel::<i32>(0, 10);
        rx.put_back(42);
        tx.put(99).unwrap();

        assert_eq!(rx.get().unwrap(), Some(42));
        assert_eq!(rx.get().unwrap(), Some(99));
    }

    #[test]
    fn test_poll_ready_keeps_item() {
        let (mut tx, mut rx) = channel::<i32>(0, 10);
        assert_eq!(rx.poll_ready(), Readiness::Pending);
        assert!(!rx.has_buffered());

        tx.put(77).unwrap();
        assert_eq!(rx.poll_ready(), Readiness::Ready);
        assert!(rx.has_buffered());
        assert_eq!(rx.poll_ready(), Readiness::Ready);

        assert_eq!(rx.get().unwrap(), Some(77));
        assert!(!rx.has_buffered());
    }

    #[test]
    fn test_exhaustion_after_drain() {
        let (mut tx, mut rx) = channel::<i32>(3, 10);
        tx.put(42).unwrap();
        tx.close();

        assert_eq!(rx.try_get(), TryGet::Item(42));
        assert_eq!(rx.try_get(), TryGet::Exhausted);
        assert!(rx.is_exhausted());
        assert_eq!(rx.get().unwrap(), None);
        assert_eq!(rx.get().unwrap(), None);
    }

    #[test]
    fn test_put_back_after_exhaustion() {
        let (tx, mut rx) = channel::<i32>(0, 1);
        drop(tx);
        assert_eq!(rx.poll_ready(), Readiness::Exhausted);

        rx.put_back(5);
        assert_eq!(rx.poll_ready(), Readiness::Ready);
        assert_eq!(rx.get().unwrap(), Some(5));
        assert_eq!(rx.get().unwrap(), None);
    }

    #[test]
    fn test_get_wakes_when_producer_closes() {
        let (mut tx, mut rx) = channel::<i32>(0, 1);
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            tx.put(1).unwrap();
            tx.close();
        });

        assert_eq!(rx.get().unwrap(), Some(1));
        assert_eq!(rx.get().unwrap(), None);
        producer.join().unwrap();
    }

    #[test]
    fn test_blocked_get_observes_abort() {
        let abort = Signal::new();
        let (_tx, mut rxs) = wired::<i32>(0, 1, 1, abort.clone(), Duration::from_millis(10));
        let mut rx = rxs.remove(0);

        let consumer = thread::spawn(move || rx.get());
        thread::sleep(Duration::from_millis(50));
        abort.raise();
        assert_eq!(consumer.join().unwrap(), Err(ChannelError::Aborted));
    }

    #[test]
    fn test_drain_discards_everything_readable() {
        let (mut tx, mut rx) = channel::<i32>(0, 4);
        tx.put(1).unwrap();
        tx.put(2).unwrap();
        tx.put(3).unwrap();
        assert_eq!(rx.poll_ready(), Readiness::Ready);

        assert_eq!(rx.drain(), 3);
        assert_eq!(rx.try_get(), TryGet::Empty);
    }
}
