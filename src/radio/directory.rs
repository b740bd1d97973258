//! # Node Directory
//!
//! Small cache of node addresses seen on the network.
//!
//! Entries are kept in a bounded array and found by linear scan; it is
//! consulted once per message, so the scan is cheap for a herd-sized network.
//! A high node count deployment should swap the array for a keyed map.

use tracing::debug;

use crate::protocol::types::NodeAddress;

/// Default number of nodes remembered
pub const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
struct Entry {
    address: NodeAddress,
    last_seen: u64,
}

/// Bounded node address cache with least-recently-seen eviction
#[derive(Debug, Clone)]
pub struct NodeDirectory {
    entries: Vec<Entry>,
    capacity: usize,
    tick: u64,
}

impl Default for NodeDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NodeDirectory {
    /// Create a directory holding at most `capacity` nodes (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            tick: 0,
        }
    }

    /// Record that `address` was seen and return the merged entry
    ///
    /// The 16-bit address is refreshed (it changes across re-joins). A known
    /// identifier is kept when the observation carries none.
    pub fn observe(&mut self, address: &NodeAddress) -> NodeAddress {
        self.tick += 1;
        let tick = self.tick;

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.address.addr64 == address.addr64)
        {
            if entry.address.addr16 != address.addr16 {
                debug!(
                    "Node {:016X} short address changed {:04X} -> {:04X}",
                    address.addr64, entry.address.addr16, address.addr16
                );
                entry.address.addr16 = address.addr16;
            }
            if address.identifier.is_some() {
                entry.address.identifier = address.identifier.clone();
            }
            entry.last_seen = tick;
            return entry.address.clone();
        }

        if self.entries.len() == self.capacity {
            if let Some(oldest) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(i, _)| i)
            {
                let evicted = self.entries.swap_remove(oldest);
                debug!("Evicting node {} from directory", evicted.address);
            }
        }

        self.entries.push(Entry {
            address: address.clone(),
            last_seen: tick,
        });
        address.clone()
    }

    /// Entry for a hardware address
    pub fn get(&self, addr64: u64) -> Option<&NodeAddress> {
        self.entries
            .iter()
            .map(|e| &e.address)
            .find(|a| a.addr64 == addr64)
    }

    /// Entry for a node identifier
    pub fn resolve(&self, identifier: &str) -> Option<&NodeAddress> {
        self.entries
            .iter()
            .map(|e| &e.address)
            .find(|a| a.identifier.as_deref() == Some(identifier))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_new_node() {
        let mut dir = NodeDirectory::new(4);
        let merged = dir.observe(&NodeAddress::new(1, 0x10));

        assert_eq!(merged, NodeAddress::new(1, 0x10));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get(1).unwrap().addr16, 0x10);
    }

    #[test]
    fn test_short_address_changes_on_rejoin() {
        let mut dir = NodeDirectory::new(4);
        dir.observe(&NodeAddress::with_identifier(1, 0x10, "Denver"));
        let merged = dir.observe(&NodeAddress::new(1, 0x22));

        assert_eq!(dir.len(), 1);
        assert_eq!(merged.addr16, 0x22);
        assert_eq!(merged.identifier.as_deref(), Some("Denver"));
    }

    #[test]
    fn test_resolve_by_identifier() {
        let mut dir = NodeDirectory::new(4);
        dir.observe(&NodeAddress::with_identifier(1, 0x10, "Denver"));
        dir.observe(&NodeAddress::with_identifier(2, 0x11, "Comet"));

        assert_eq!(dir.resolve("Comet").unwrap().addr64, 2);
        assert!(dir.resolve("Blitzen").is_none());
    }

    #[test]
    fn test_evicts_least_recently_seen() {
        let mut dir = NodeDirectory::new(2);
        dir.observe(&NodeAddress::new(1, 1));
        dir.observe(&NodeAddress::new(2, 2));
        dir.observe(&NodeAddress::new(1, 1)); // refresh node 1
        dir.observe(&NodeAddress::new(3, 3));

        assert_eq!(dir.len(), 2);
        assert!(dir.get(1).is_some());
        assert!(dir.get(2).is_none());
        assert!(dir.get(3).is_some());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut dir = NodeDirectory::new(0);
        assert_eq!(dir.capacity(), 1);
        dir.observe(&NodeAddress::new(1, 1));
        dir.observe(&NodeAddress::new(2, 2));
        assert_eq!(dir.len(), 1);
        assert!(dir.get(2).is_some());
    }
}
