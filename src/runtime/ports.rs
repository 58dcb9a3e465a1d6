//! Port schemas and port-to-channel mappings
//!
//! Every block declares its ports as an ordered list of [`PortSchema`]s. When the
//! block is added to a pipeline it comes with a [`PortMap`] binding each port name
//! to an integer channel key. The pipeline checks the two against each other before
//! anything runs.

use super::channel::ChannelKey;
use std::collections::BTreeMap;
use std::fmt;

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PortDirection::Input => write!(f, "input"),
            PortDirection::Output => write!(f, "output"),
        }
    }
}

/// Schema describing one port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSchema {
    pub name: String,
    pub index: usize,
    pub direction: PortDirection,
    /// Output only: the port may be left out of the mapping, dropping its items
    pub discardable: bool,
}

impl PortSchema {
    pub fn new(name: impl Into<String>, index: usize, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            index,
            direction,
            discardable: false,
        }
    }

    pub fn input(name: impl Into<String>, index: usize) -> Self {
        Self::new(name, index, PortDirection::Input)
    }

    pub fn output(name: impl Into<String>, index: usize) -> Self {
        Self::new(name, index, PortDirection::Output)
    }

    /// Allow this output to stay unmapped
    pub fn discardable(mut self) -> Self {
        self.discardable = true;
        self
    }

    /// `count` ports named `in_1..in_N` or `out_1..out_N`
    pub fn numbered(direction: PortDirection, count: usize) -> Vec<PortSchema> {
        let prefix = match direction {
            PortDirection::Input => "in",
            PortDirection::Output => "out",
        };
        (0..count)
            .map(|i| PortSchema::new(format!("{}_{}", prefix, i + 1), i, direction))
            .collect()
    }
}

/// Binding from port names to channel keys for one block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortMap {
    bindings: BTreeMap<String, ChannelKey>,
}

impl PortMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style bind
    pub fn bind(mut self, port: impl Into<String>, key: ChannelKey) -> Self {
        self.insert(port, key);
        self
    }

    /// Bind `port` to `key`, returning the key it was bound to before
    pub fn insert(&mut self, port: impl Into<String>, key: ChannelKey) -> Option<ChannelKey> {
        self.bindings.insert(port.into(), key)
    }

    pub fn get(&self, port: &str) -> Option<ChannelKey> {
        self.bindings.get(port).copied()
    }

    pub fn contains(&self, port: &str) -> bool {
        self.bindings.contains_key(port)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ChannelKey)> {
        self.bindings.iter().map(|(port, key)| (port.as_str(), *key))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<S: Into<String>, const N: usize> From<[(S, ChannelKey); N]> for PortMap {
    fn from(bindings: [(S, ChannelKey); N]) -> Self {
        bindings.into_iter().collect()
    }
}

impl<S: Into<String>> FromIterator<(S, ChannelKey)> for PortMap {
    fn from_iter<I: IntoIterator<Item = (S, ChannelKey)>>(iter: I) -> Self {
        let mut map = PortMap::new();
        for (port, key) in iter {
            map.insert(port, key);
        }
        map
    }
}
