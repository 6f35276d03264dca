//! Consistent hash ring for key-to-peer placement.
//!
//! Maps arbitrary string keys to one of a set of registered node ids. Each
//! node is placed on the ring at `replicas` virtual positions, so adding or
//! removing one node only remaps the keys that fall between its positions
//! and their neighbours instead of reshuffling everything, which is what
//! plain `hash % nodes` selection would do.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Ring Placement                                │
//! │                                                                         │
//! │   add("A"), replicas = 3                                                │
//! │     hash("0A"), hash("1A"), hash("2A")  ──► sorted positions            │
//! │                                                                         │
//! │              0 ─────────────────────────────────────────► u32::MAX      │
//! │   positions:  │  A0   B1    A2      B0   A1      B2  │                  │
//! │                                                                         │
//! │   get("user:7"):                                                        │
//! │     h = hash("user:7")                                                  │
//! │     first position >= h, wrapping to the first position past the end   │
//! │     ──► owning node id                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use peercache::ds::HashRing;
//!
//! let mut ring = HashRing::new(50);
//! ring.add(["10.0.0.1:8001", "10.0.0.2:8001", "10.0.0.3:8001"]);
//!
//! let owner = ring.get("user:123").unwrap();
//! assert_eq!(ring.get("user:123"), Some(owner));
//! ```
//!
//! ## Collisions
//!
//! When two virtual positions hash to the same value the position is kept
//! twice in the sorted sequence but the lookup table keeps the last writer.
//! Removing either node drops one copy and leaves the other node owning the
//! position. Collisions are rare with CRC-32 and only shift a sliver of keys.
//!
//! ## Performance
//!
//! - `add`: O(r·n log(r·n)) for r replicas over n nodes (one sort per call)
//! - `get`: O(log(r·n)) binary search

use rustc_hash::FxHashMap;

use crate::error::ConfigError;

/// Hash function used to place nodes and keys on the ring.
pub type HashFn = fn(&[u8]) -> u32;

/// Virtual positions per node used by [`HashRing::default`].
pub const DEFAULT_REPLICAS: usize = 50;

/// CRC-32 (IEEE) checksum, the ring's default placement hash.
pub fn crc32_ieee(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Consistent hash ring over string node ids.
#[derive(Debug, Clone)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    positions: Vec<u32>,
    owners: FxHashMap<u32, String>,
}

impl HashRing {
    /// Creates an empty ring that places each node at `replicas` positions,
    /// hashing with CRC-32.
    ///
    /// A ring built with `replicas == 0` accepts nodes but never places
    /// them, so every lookup returns `None`. Use [`try_new`](Self::try_new)
    /// to reject that configuration instead.
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, crc32_ieee)
    }

    /// Creates an empty ring, rejecting a zero replica count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `replicas` is zero.
    ///
    /// ```
    /// use peercache::ds::HashRing;
    ///
    /// assert!(HashRing::try_new(0).is_err());
    /// assert_eq!(HashRing::try_new(3).unwrap().replicas(), 3);
    /// ```
    pub fn try_new(replicas: usize) -> Result<Self, ConfigError> {
        if replicas == 0 {
            return Err(ConfigError::new(
                "hash ring replicas must be greater than zero",
            ));
        }
        Ok(Self::new(replicas))
    }

    /// Creates an empty ring with a custom placement hash.
    ///
    /// ```
    /// use peercache::ds::HashRing;
    ///
    /// fn decimal(data: &[u8]) -> u32 {
    ///     std::str::from_utf8(data).unwrap().parse().unwrap()
    /// }
    ///
    /// let mut ring = HashRing::with_hasher(3, decimal);
    /// ring.add(["6", "4", "2"]);
    /// assert_eq!(ring.get("11"), Some("2"));
    /// assert_eq!(ring.get("27"), Some("2"));
    /// ```
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas,
            positions: Vec::new(),
            owners: FxHashMap::default(),
        }
    }

    /// Returns the number of virtual positions per node.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Places every node in `nodes` on the ring.
    ///
    /// Virtual position `i` of node `n` is `hash(format!("{i}{n}"))`.
    pub fn add<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for node in nodes {
            let node = node.as_ref();
            for i in 0..self.replicas {
                let position = (self.hash)(format!("{i}{node}").as_bytes());
                self.positions.push(position);
                self.owners.insert(position, node.to_owned());
            }
        }
        self.positions.sort_unstable();
    }

    /// Removes every virtual position owned by `node`.
    ///
    /// Each of the node's positions drops exactly one occurrence from the
    /// sorted sequence. A position it shared with a surviving node stays on
    /// the ring and is handed back to that node.
    ///
    /// Returns `false` if the node was not on the ring.
    pub fn remove(&mut self, node: &str) -> bool {
        if !self.contains_node(node) {
            return false;
        }
        self.owners.retain(|_, owner| owner != node);
        for i in 0..self.replicas {
            let position = (self.hash)(format!("{i}{node}").as_bytes());
            if let Ok(idx) = self.positions.binary_search(&position) {
                self.positions.remove(idx);
            }
        }

        let mut survivors: Vec<String> = self.owners.values().cloned().collect();
        survivors.sort_unstable();
        survivors.dedup();
        for survivor in &survivors {
            for i in 0..self.replicas {
                let position = (self.hash)(format!("{i}{survivor}").as_bytes());
                if self.positions.binary_search(&position).is_ok() {
                    self.owners
                        .entry(position)
                        .or_insert_with(|| survivor.clone());
                }
            }
        }
        // a node added more than once leaves extra copies with no owner
        let owners = &self.owners;
        self.positions.retain(|position| owners.contains_key(position));
        true
    }

    /// Returns the node that owns `key`, or `None` for an empty ring.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }
        let hash = (self.hash)(key.as_bytes());
        let idx = self.positions.partition_point(|&position| position < hash);
        let position = self.positions[idx % self.positions.len()];
        self.owners.get(&position).map(String::as_str)
    }

    /// Returns `true` if `node` owns at least one position.
    pub fn contains_node(&self, node: &str) -> bool {
        self.owners.values().any(|owner| owner == node)
    }

    /// Returns the number of distinct nodes on the ring.
    pub fn node_count(&self) -> usize {
        let mut nodes: Vec<&str> = self.owners.values().map(String::as_str).collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes.len()
    }

    /// Returns the number of virtual positions on the ring.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert!(self.positions.windows(2).all(|w| w[0] <= w[1]));
        for position in &self.positions {
            assert!(self.owners.contains_key(position));
        }
    }
}

impl Default for HashRing {
    /// Creates an empty CRC-32 ring with [`DEFAULT_REPLICAS`] positions per node.
    fn default() -> Self {
        Self::new(DEFAULT_REPLICAS)
    }
}
