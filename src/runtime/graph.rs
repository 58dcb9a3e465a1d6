//! Channel graph derived from the pipeline's port mappings
//!
//! Records, for every channel key, which block port writes it and which block
//! ports read it. The pipeline uses this to reject bad wiring and to compute a
//! topological execution order.

use super::channel::ChannelKey;
use std::collections::{BTreeMap, VecDeque};

/// A (block, port) pair. `block` is the block's position in the pipeline and
/// `port` the port's index within its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub block: usize,
    pub port: usize,
}

impl Endpoint {
    pub fn new(block: usize, port: usize) -> Self {
        Self { block, port }
    }
}

/// Producer and consumers of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub key: ChannelKey,
    pub producer: Option<Endpoint>,
    pub consumers: Vec<Endpoint>,
}

impl ChannelInfo {
    fn new(key: ChannelKey) -> Self {
        Self {
            key,
            producer: None,
            consumers: Vec::new(),
        }
    }
}

/// Channel connectivity of a pipeline
#[derive(Debug, Clone, Default)]
pub struct ChannelGraph {
    channels: BTreeMap<ChannelKey, ChannelInfo>,
}

impl ChannelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn producer(&self, key: ChannelKey) -> Option<Endpoint> {
        self.channels.get(&key).and_then(|c| c.producer)
    }

    pub fn consumers(&self, key: ChannelKey) -> &[Endpoint] {
        self.channels
            .get(&key)
            .map(|c| c.consumers.as_slice())
            .unwrap_or(&[])
    }

    /// Record the producer of `key`, returning the previous one if any
    pub(crate) fn set_producer(&mut self, key: ChannelKey, endpoint: Endpoint) -> Option<Endpoint> {
        self.channels
            .entry(key)
            .or_insert_with(|| ChannelInfo::new(key))
            .producer
            .replace(endpoint)
    }

    pub(crate) fn add_consumer(&mut self, key: ChannelKey, endpoint: Endpoint) {
        self.channels
            .entry(key)
            .or_insert_with(|| ChannelInfo::new(key))
            .consumers
            .push(endpoint);
    }

    /// All channels in key order
    pub fn channels(&self) -> impl Iterator<Item = &ChannelInfo> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Consumers of channels that nobody produces
    pub fn unbound(&self) -> Vec<(ChannelKey, Endpoint)> {
        self.channels
            .values()
            .filter(|c| c.producer.is_none())
            .flat_map(|c| c.consumers.iter().map(move |e| (c.key, *e)))
            .collect()
    }

    /// Produced channels that nobody reads
    pub fn dangling(&self) -> Vec<ChannelKey> {
        self.channels
            .values()
            .filter(|c| c.producer.is_some() && c.consumers.is_empty())
            .map(|c| c.key)
            .collect()
    }

    /// Topological order of blocks `0..num_blocks` using Kahn's algorithm.
    ///
    /// Ties go to the lower index, so sources come out in entry order before
    /// anything that depends on them. On a cycle, returns `Err` with the index of
    /// a block that is part of it (or downstream of it).
    pub fn execution_order(&self, num_blocks: usize) -> Result<Vec<usize>, usize> {
        let mut in_degree = vec![0usize; num_blocks];
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); num_blocks];

        for channel in self.channels.values() {
            let Some(producer) = channel.producer else {
                continue;
            };
            for consumer in &channel.consumers {
                in_degree[consumer.block] += 1;
                downstream[producer.block].push(consumer.block);
            }
        }

        let mut ready: VecDeque<usize> = (0..num_blocks).filter(|&b| in_degree[b] == 0).collect();
        let mut order = Vec::with_capacity(num_blocks);

        while let Some(block) = ready.pop_front() {
            order.push(block);
            for &next in &downstream[block] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push_back(next);
                }
            }
        }

        if order.len() < num_blocks {
            let stuck = (0..num_blocks).find(|&b| in_degree[b] > 0).unwrap_or(0);
            return Err(stuck);
        }
        Ok(order)
    }
}
