//! Pipeline configuration

use super::channel::{ChannelKey, DEFAULT_POLL_INTERVAL};
use std::collections::HashMap;
use std::time::Duration;

/// How blocks are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One thread per block
    #[default]
    Threaded,
    /// Single thread, round-robin over runnable blocks in topological order
    Cooperative,
}

/// Tunables for building and running a pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    default_capacity: usize,
    capacities: HashMap<ChannelKey, usize>,
    mode: ExecutionMode,
    poll_interval: Duration,
    watchdog_threshold: Option<Duration>,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self {
            default_capacity: 8,
            capacities: HashMap::new(),
            mode: ExecutionMode::Threaded,
            poll_interval: DEFAULT_POLL_INTERVAL,
            watchdog_threshold: Some(Duration::from_secs(5)),
        }
    }

    /// Capacity of every channel without an explicit override
    pub fn with_default_capacity(mut self, capacity: usize) -> Self {
        self.default_capacity = capacity;
        self
    }

    /// Capacity of one channel
    pub fn with_capacity(mut self, key: ChannelKey, capacity: usize) -> Self {
        self.capacities.insert(key, capacity);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// How often blocked channel operations wake to check for an abort
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Warn about channel operations blocked longer than `threshold`
    pub fn with_watchdog(mut self, threshold: Duration) -> Self {
        self.watchdog_threshold = Some(threshold);
        self
    }

    pub fn without_watchdog(mut self) -> Self {
        self.watchdog_threshold = None;
        self
    }

    pub fn capacity_for(&self, key: ChannelKey) -> usize {
        self.capacities
            .get(&key)
            .copied()
            .unwrap_or(self.default_capacity)
    }

    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn watchdog_threshold(&self) -> Option<Duration> {
        self.watchdog_threshold
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}
