//! Producer endpoint of a channel, broadcasting to every reader

use crossbeam_channel::{SendTimeoutError, Sender as CrossbeamSender, TrySendError};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use super::channel::ChannelKey;
use super::errors::ChannelError;
use super::signal::Signal;
use super::watchdog::{OperationGuard, WatchdogHandle};

/// Rejected non-blocking put; the item is handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryPutError<T> {
    /// Some reader's buffer is at capacity
    Full(T),
    /// The channel was already closed
    Closed(T),
    /// Every reader has gone away
    Disconnected(T),
}

impl<T> TryPutError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TryPutError::Full(item) | TryPutError::Closed(item) | TryPutError::Disconnected(item) => {
                item
            }
        }
    }
}

/// Sending half of a channel.
///
/// There is exactly one per channel key. Each reader has its own crossbeam queue;
/// `put` delivers a clone to all of them, blocking on whichever is full.
pub struct Sender<T> {
    key: ChannelKey,
    destinations: Vec<CrossbeamSender<T>>,
    had_readers: bool,
    closed: bool,
    abort: Signal,
    poll_interval: Duration,
    watchdog_handle: Option<WatchdogHandle>,
}

impl<T: Clone> Sender<T> {
    pub(crate) fn new(
        key: ChannelKey,
        destinations: Vec<CrossbeamSender<T>>,
        abort: Signal,
        poll_interval: Duration,
    ) -> Self {
        Self {
            key,
            had_readers: !destinations.is_empty(),
            destinations,
            closed: false,
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

    /// Number of readers still attached
    pub fn num_destinations(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Append `item` to every reader's FIFO, waiting while any of them is full.
    ///
    /// Readers that have gone away are skipped. Fails with
    /// [`ChannelError::Disconnected`] once none are left, with
    /// [`ChannelError::Closed`] after [`close`](Self::close), and with
    /// [`ChannelError::Aborted`] if the pipeline aborts while waiting.
    pub fn put(&mut self, item: T) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed { key: self.key });
        }
        if self.destinations.is_empty() {
            return self.no_destinations();
        }

        let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);

        let destinations = std::mem::take(&mut self.destinations);
        let count = destinations.len();
        let mut item = Some(item);
        let mut aborted = false;

        for (i, dest) in destinations.into_iter().enumerate() {
            if aborted {
                self.destinations.push(dest);
                continue;
            }
            let value = if i + 1 == count { item.take() } else { item.clone() };
            let Some(value) = value else {
                self.destinations.push(dest);
                continue;
            };
            match self.send_blocking(&dest, value) {
                Ok(()) => self.destinations.push(dest),
                Err(ChannelError::Aborted) => {
                    aborted = true;
                    self.destinations.push(dest);
                }
                Err(_) => debug!("Channel {}: reader went away, dropping it", self.key),
            }
        }

        if aborted {
            return Err(ChannelError::Aborted);
        }
        if self.destinations.is_empty() {
            return Err(ChannelError::Disconnected { key: self.key });
        }
        Ok(())
    }

    /// Put without blocking. Succeeds only if every reader has room.
    pub fn try_put(&mut self, item: T) -> Result<(), TryPutError<T>> {
        if self.closed {
            return Err(TryPutError::Closed(item));
        }
        if self.destinations.is_empty() {
            return match self.no_destinations() {
                Ok(()) => Ok(()),
                Err(_) => Err(TryPutError::Disconnected(item)),
            };
        }
        if !self.has_capacity() {
            return Err(TryPutError::Full(item));
        }

        let destinations = std::mem::take(&mut self.destinations);
        for dest in destinations {
            match dest.try_send(item.clone()) {
                Ok(()) => self.destinations.push(dest),
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Channel {}: reader went away, dropping it", self.key)
                }
                Err(TrySendError::Full(value)) => {
                    // Room was checked above; wait rather than lose the item.
                    if self.send_blocking(&dest, value).is_ok() {
                        self.destinations.push(dest);
                    }
                }
            }
        }

        if self.destinations.is_empty() {
            return Err(TryPutError::Disconnected(item));
        }
        Ok(())
    }

    /// True when a put would not block
    pub fn has_capacity(&self) -> bool {
        self.destinations.iter().all(|dest| !dest.is_full())
    }

    /// Mark the end of the stream. Idempotent; buffered items stay readable.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.destinations.clear();
            debug!("Channel {} closed", self.key);
        }
    }

    fn no_destinations(&self) -> Result<(), ChannelError> {
        if self.had_readers {
            Err(ChannelError::Disconnected { key: self.key })
        } else {
            Ok(())
        }
    }

    fn send_blocking(&self, dest: &CrossbeamSender<T>, mut value: T) -> Result<(), ChannelError> {
        loop {
            match dest.send_timeout(value, self.poll_interval) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(v)) => {
                    if self.abort.is_raised() {
                        return Err(ChannelError::Aborted);
                    }
                    value = v;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(ChannelError::Disconnected { key: self.key });
                }
            }
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Sender")
            .field("key", &self.key)
            .field("destinations", &self.destinations.len())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::runtime::channel::{broadcast, channel, wired};
    use crate::runtime::errors::ChannelError;
    use crate::runtime::sender::TryPutError;
    use crate::runtime::signal::Signal;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_put_after_close_fails() {
        let (mut tx, _rx) = channel::<u32>(4, 2);
        tx.close();
        assert_eq!(tx.put(1), Err(ChannelError::Closed { key: 4 }));
        assert_eq!(tx.try_put(1), Err(TryPutError::Closed(1)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut tx, mut rx) = channel::<u32>(0, 2);
        tx.put(9).unwrap();
        tx.close();
        tx.close();
        assert!(tx.is_closed());
        assert_eq!(rx.get().unwrap(), Some(9));
        assert_eq!(rx.get().unwrap(), None);
    }

    #[test]
    fn test_try_put_reports_full() {
        let (mut tx, mut rx) = channel::<u32>(0, 1);
        tx.try_put(1).unwrap();
        assert_eq!(tx.try_put(2), Err(TryPutError::Full(2)));
        assert_eq!(rx.get().unwrap(), Some(1));
        tx.try_put(2).unwrap();
    }

    #[test]
    fn test_capacity_backpressure_suspends_producer() {
        let (mut tx, mut rx) = channel::<u32>(0, 1);
        tx.put(1).unwrap();

        let second_done = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&second_done);
        let producer = thread::spawn(move || {
            tx.put(2).unwrap();
            done.store(true, Ordering::SeqCst);
            tx
        });

        thread::sleep(Duration::from_millis(150));
        assert!(!second_done.load(Ordering::SeqCst), "second put must wait for room");

        assert_eq!(rx.get().unwrap(), Some(1));
        let _tx = producer.join().unwrap();
        assert!(second_done.load(Ordering::SeqCst));
        assert_eq!(rx.get().unwrap(), Some(2));
    }

    #[test]
    fn test_put_skips_departed_reader() {
        let (mut tx, mut rxs) = broadcast::<u32>(2, 2, 2);
        let gone = rxs.pop().unwrap();
        drop(gone);

        tx.put(1).unwrap();
        assert_eq!(tx.num_destinations(), 1);
        assert_eq!(rxs[0].get().unwrap(), Some(1));
    }

    #[test]
    fn test_put_disconnected_when_all_readers_gone() {
        let (mut tx, rx) = channel::<u32>(5, 2);
        drop(rx);
        assert_eq!(tx.put(1), Err(ChannelError::Disconnected { key: 5 }));
        assert_eq!(tx.try_put(2), Err(TryPutError::Disconnected(2)));
    }

    #[test]
    fn test_blocked_put_observes_abort() {
        let abort = Signal::new();
        let (mut tx, _rxs) = wired::<u32>(0, 1, 1, abort.clone(), Duration::from_millis(10));
        tx.put(1).unwrap();

        let producer = thread::spawn(move || tx.put(2));
        thread::sleep(Duration::from_millis(50));
        abort.raise();
        assert_eq!(producer.join().unwrap(), Err(ChannelError::Aborted));
    }
}
