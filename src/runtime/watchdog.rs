//! Channel operation watchdog for spotting stuck blocks
//!
//! Each sender/receiver stores the start time of its current blocking operation in an
//! atomic. A monitor thread scans those timestamps and logs once per operation that
//! stays blocked longer than the threshold, and again when it finally completes.

use super::channel::ChannelKey;
use super::signal::Signal;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Milliseconds since UNIX_EPOCH, never 0 in practice
#[inline(always)]
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

struct OperationState {
    /// Start of the current operation, 0 when idle
    started_at: AtomicU64,
    has_warned: AtomicBool,
    block: String,
    operation: &'static str,
    key: ChannelKey,
}

/// Handle held by a channel endpoint
#[derive(Clone)]
pub struct WatchdogHandle {
    state: Arc<OperationState>,
}

impl WatchdogHandle {
    #[inline(always)]
    fn start_operation(&self) {
        self.state.started_at.store(now_millis(), Ordering::Relaxed);
        self.state.has_warned.store(false, Ordering::Relaxed);
    }

    #[inline(always)]
    fn finish_operation(&self) {
        if self.state.has_warned.swap(false, Ordering::Relaxed) {
            info!(
                "UNBLOCKED: [{}] {} on channel {}",
                self.state.block, self.state.operation, self.state.key
            );
        }
        self.state.started_at.store(0, Ordering::Relaxed);
    }
}

/// Shared watchdog registry
#[derive(Clone)]
pub struct Watchdog {
    operations: Arc<Mutex<Vec<Weak<OperationState>>>>,
    threshold: Duration,
    shutdown: Signal,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Watchdog {
    pub fn new(threshold: Duration) -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        Self {
            operations: Arc::new(Mutex::new(Vec::new())),
            threshold,
            shutdown: Signal::new(),
            wake_tx,
            wake_rx,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Register one endpoint of `block` on channel `key`
    pub fn register(&self, block: &str, operation: &'static str, key: ChannelKey) -> WatchdogHandle {
        let state = Arc::new(OperationState {
            started_at: AtomicU64::new(0),
            has_warned: AtomicBool::new(false),
            block: block.to_string(),
            operation,
            key,
        });

        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&state));

        WatchdogHandle { state }
    }

    /// Scan live operations and warn about the ones blocked past the threshold.
    /// Returns how many operations are currently over the threshold.
    pub fn check_for_blocked(&self) -> usize {
        let now = now_millis();
        let threshold_ms = self.threshold.as_millis() as u64;
        let mut blocked = 0;

        let mut operations = self.operations.lock().unwrap_or_else(PoisonError::into_inner);
        operations.retain(|weak| {
            let Some(state) = weak.upgrade() else {
                return false;
            };
            let start = state.started_at.load(Ordering::Relaxed);
            if start > 0 {
                let elapsed_ms = now.saturating_sub(start);
                if elapsed_ms > threshold_ms {
                    blocked += 1;
                    if !state.has_warned.swap(true, Ordering::Relaxed) {
                        warn!(
                            "BLOCKED: [{}] {} on channel {} for {:.1}s",
                            state.block,
                            state.operation,
                            state.key,
                            elapsed_ms as f64 / 1000.0
                        );
                    }
                }
            }
            true
        });
        blocked
    }

    /// Start the monitor thread. It exits after `stop()`.
    pub fn start_monitoring_thread(&self) -> JoinHandle<()> {
        let watchdog = self.clone();
        let period = (self.threshold / 5).clamp(Duration::from_millis(10), Duration::from_secs(1));
        std::thread::spawn(move || {
            while !watchdog.shutdown.is_raised() {
                match watchdog.wake_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        watchdog.check_for_blocked();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
    }

    /// Stop the monitor thread without waiting out its current period
    pub fn stop(&self) {
        self.shutdown.raise();
        let _ = self.wake_tx.try_send(());
    }
}

/// RAII guard marking one blocking operation
pub(crate) struct OperationGuard<'a> {
    handle: &'a WatchdogHandle,
}

impl<'a> OperationGuard<'a> {
    #[inline(always)]
    pub(crate) fn new(handle: &'a WatchdogHandle) -> Self {
        handle.start_operation();
        Self { handle }
    }
}

impl Drop for OperationGuard<'_> {
    #[inline(always)]
    fn drop(&mut self) {
        self.handle.finish_operation();
    }
}
