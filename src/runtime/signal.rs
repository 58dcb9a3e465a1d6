//! Shared one-way flags used to stop or abort a running pipeline

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A flag that starts lowered and can only be raised.
#[derive(Debug, Clone, Default)]
pub(crate) struct Signal(Arc<AtomicBool>);

impl Signal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Requests a graceful stop.
///
/// Once stopped, every source observing this handle reports exhaustion on its next
/// step, and the end of stream propagates downstream like any other. Clones share
/// the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    signal: Signal,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_signal(signal: Signal) -> Self {
        Self { signal }
    }

    /// Request the stop. Idempotent.
    pub fn stop(&self) {
        self.signal.raise();
    }

    pub fn is_stopped(&self) -> bool {
        self.signal.is_raised()
    }
}
