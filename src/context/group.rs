//! Shard groups: deterministic key → endpoint mapping.
//!
//! Keys map to one of [`SLOT_COUNT`] slots with the CRC16 (XMODEM) hash that
//! Redis Cluster uses, and slots map to nodes in contiguous ranges. The
//! mapping depends only on the key bytes and the node count, so every client
//! build routes a key to the same node. As in Redis Cluster, a non-empty
//! `{tag}` inside the key is hashed instead of the whole key, which keeps
//! related keys together.

use crate::context::settings::StoreSettings;
use crate::error::{Result, StoreError};

/// Maps a key to the settings of the endpoint that owns it.
///
/// Implementations must return the same endpoint for the same key as long
/// as their topology does not change.
pub trait GroupResolver: Send + Sync {
    fn resolve(&self, key: &str) -> Result<StoreSettings>;
}

/// Spreads keys over a fixed list of endpoints by key hash.
#[derive(Debug, Clone)]
pub struct KeyHashGroup {
    name: String,
    nodes: Vec<StoreSettings>,
}

impl KeyHashGroup {
    pub fn new(name: impl Into<String>, nodes: Vec<StoreSettings>) -> Self {
        Self {
            name: name.into(),
            nodes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[StoreSettings] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the node owning `key`. The group must not be empty.
    fn node_index(&self, key: &str) -> usize {
        hash_slot(key.as_bytes()) as usize * self.nodes.len() / SLOT_COUNT as usize
    }
}

/// Number of hash slots.
pub const SLOT_COUNT: u16 = 16384;

/// CRC16/XMODEM: polynomial 0x1021, initial value 0.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Slot of `key`, honouring `{tag}` hash tags.
pub fn hash_slot(key: &[u8]) -> u16 {
    let hashed = match key.iter().position(|&b| b == b'{') {
        Some(open) => match key[open + 1..].iter().position(|&b| b == b'}') {
            Some(len) if len > 0 => &key[open + 1..open + 1 + len],
            _ => key,
        },
        None => key,
    };
    crc16(hashed) % SLOT_COUNT
}

impl GroupResolver for KeyHashGroup {
    fn resolve(&self, key: &str) -> Result<StoreSettings> {
        if self.nodes.is_empty() {
            return Err(StoreError::unavailable(&self.name, "group has no endpoints"));
        }
        Ok(self.nodes[self.node_index(key)].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn group(size: usize) -> KeyHashGroup {
        let nodes = (0..size)
            .map(|i| StoreSettings::channel(Arc::new(MemoryStore::named(format!("node-{}", i)))))
            .collect();
        KeyHashGroup::new("cache", nodes)
    }

    #[test]
    fn test_same_key_same_node() {
        let group = group(4);
        for i in 0..50 {
            let key = format!("leaderboard:{}", i);
            let first = group.resolve(&key).unwrap();
            let second = group.resolve(&key).unwrap();
            assert_eq!(first.name(), second.name());
        }
    }

    #[test]
    fn test_keys_spread_over_nodes() {
        let group = group(4);
        let used: HashSet<String> = (0..200)
            .map(|i| group.resolve(&format!("key:{}", i)).unwrap().name().to_string())
            .collect();
        assert!(used.len() > 1);
    }

    #[test]
    fn test_empty_group_is_unavailable() {
        let group = group(0);
        let err = group.resolve("anything").unwrap_err();
        assert!(matches!(
            err,
            StoreError::ConnectionUnavailable { ref endpoint, .. } if endpoint == "cache"
        ));
    }

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_hash_slot_matches_cluster_slots() {
        assert_eq!(hash_slot(b"foo"), 12182);
        assert_eq!(hash_slot(b"bar"), 5061);
        assert_eq!(
            hash_slot(b"{user1000}.following"),
            hash_slot(b"{user1000}.followers")
        );
        assert_eq!(hash_slot(b"{user1000}.following"), hash_slot(b"user1000"));
        // An empty tag hashes the whole key.
        assert_eq!(hash_slot(b"foo{}bar"), crc16(b"foo{}bar") % SLOT_COUNT);
    }

    #[test]
    fn test_routing_is_fixed_by_slot() {
        let group = group(4);
        assert_eq!(group.resolve("foo").unwrap().name(), "memory://node-2");
        assert_eq!(group.resolve("bar").unwrap().name(), "memory://node-1");
    }
}
