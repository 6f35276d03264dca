//! # Byte-Bounded LRU Cache
//!
//! The local store behind every cache group. Capacity is measured in bytes,
//! where an entry weighs `key.len() + value.len()`, and the least recently
//! used entries are evicted one at a time until the cache fits again.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────────────┐
//!   │                      ConcurrentByteLruCache                              │
//!   │                                                                          │
//!   │   ┌────────────────────────────────────────────────────────────────────┐ │
//!   │   │                     Mutex<ByteLruCache>                            │ │
//!   │   └────────────────────────────────────────────────────────────────────┘ │
//!   │                                  │                                       │
//!   │                                  ▼                                       │
//!   │   ┌────────────────────────────────────────────────────────────────────┐ │
//!   │   │                         ByteLruCache                               │ │
//!   │   │                                                                    │ │
//!   │   │   FxHashMap<String, SlotId>          used_bytes / capacity_bytes   │ │
//!   │   │        │                                                           │ │
//!   │   │        ▼                                                           │ │
//!   │   │   IntrusiveList<Entry>                                             │ │
//!   │   │   head ──► ┌───────┐ ◄──► ┌───────┐ ◄──► ┌───────┐ ◄── tail        │ │
//!   │   │    (MRU)   │ Tom   │      │ Jack  │      │ Sam   │    (LRU)        │ │
//!   │   │            │ "630" │      │ "543" │      │ "432" │                 │ │
//!   │   │            └───────┘      └───────┘      └───────┘                 │ │
//!   │   └────────────────────────────────────────────────────────────────────┘ │
//!   └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operations
//!
//! | Method        | Complexity | Description                                   |
//! |---------------|------------|-----------------------------------------------|
//! | `insert`      | O(1)*      | Insert or replace, then evict while oversized |
//! | `get`         | O(1)       | Lookup and promote to MRU                     |
//! | `peek`        | O(1)       | Lookup without promotion                      |
//! | `remove`      | O(1)       | Remove by key (no eviction callback)          |
//! | `pop_lru`     | O(1)       | Remove the LRU entry (no eviction callback)   |
//! | `len`         | O(1)       | Live entries                                  |
//! | `used_bytes`  | O(1)       | Σ(key.len() + value.len())                    |
//!
//! \* amortised over the entries it evicts.
//!
//! ## Capacity 0
//!
//! A capacity of zero means *unbounded*: `insert` never evicts. It does not
//! mean "cache disabled".
//!
//! ## Eviction callback
//!
//! An optional callback receives each evicted key and value, once, in LRU
//! order. It runs while the cache is borrowed mutably (or, for the
//! concurrent wrapper, while its lock is held) and must not call back into
//! the same cache.
//!
//! ## Example Usage
//!
//! ```
//! use peercache::policy::byte_lru::ByteLruCache;
//! use peercache::store::ByteView;
//!
//! let capacity = "key1key2value1value2".len() as u64;
//! let mut cache = ByteLruCache::new(capacity);
//! cache.insert("key1", ByteView::from("value1"));
//! cache.insert("key2", ByteView::from("value2"));
//! cache.insert("k3", ByteView::from("v3"));
//!
//! assert!(cache.get("key1").is_none());
//! assert_eq!(cache.len(), 2);
//! ```

use std::fmt;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::ds::{IntrusiveList, SlotId};
use crate::error::InvariantError;
use crate::store::ByteView;

/// Callback invoked with each entry evicted for capacity.
pub type EvictionCallback = Box<dyn FnMut(String, ByteView) + Send>;

#[derive(Debug)]
struct Entry {
    key: String,
    value: ByteView,
}

impl Entry {
    #[inline]
    fn size(&self) -> u64 {
        entry_size(&self.key, &self.value)
    }
}

#[inline]
fn entry_size(key: &str, value: &ByteView) -> u64 {
    (key.len() + value.len()) as u64
}

/// Point-in-time view of a cache's occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    pub evictions: u64,
}

/// Single-threaded byte-bounded LRU cache.
pub struct ByteLruCache {
    index: FxHashMap<String, SlotId>,
    order: IntrusiveList<Entry>,
    capacity_bytes: u64,
    used_bytes: u64,
    evictions: u64,
    on_evict: Option<EvictionCallback>,
}

impl ByteLruCache {
    /// Creates an empty cache bounded to `capacity_bytes` (0 = unbounded).
    ///
    /// No storage is allocated until the first insert.
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            index: FxHashMap::default(),
            order: IntrusiveList::new(),
            capacity_bytes,
            used_bytes: 0,
            evictions: 0,
            on_evict: None,
        }
    }

    /// Creates an empty cache that reports evictions to `on_evict`.
    ///
    /// ```
    /// use std::sync::{Arc, Mutex};
    /// use peercache::policy::byte_lru::ByteLruCache;
    /// use peercache::store::ByteView;
    ///
    /// let evicted = Arc::new(Mutex::new(Vec::new()));
    /// let sink = Arc::clone(&evicted);
    /// let mut cache = ByteLruCache::with_eviction_callback(
    ///     10,
    ///     Box::new(move |key: String, _: ByteView| sink.lock().unwrap().push(key)),
    /// );
    /// cache.insert("key1", ByteView::from("123456"));
    /// cache.insert("k2", ByteView::from("k2"));
    /// cache.insert("k3", ByteView::from("k3"));
    /// cache.insert("k4", ByteView::from("k4"));
    ///
    /// assert_eq!(*evicted.lock().unwrap(), vec!["key1", "k2"]);
    /// ```
    pub fn with_eviction_callback(capacity_bytes: u64, on_evict: EvictionCallback) -> Self {
        let mut cache = Self::new(capacity_bytes);
        cache.on_evict = Some(on_evict);
        cache
    }

    /// Replaces the eviction callback.
    pub fn set_eviction_callback(&mut self, on_evict: Option<EvictionCallback>) {
        self.on_evict = on_evict;
    }

    /// Inserts or replaces `key`, promoting it to MRU, then evicts LRU
    /// entries while the cache is over capacity.
    ///
    /// Returns the previous value for `key`, if any. An entry larger than
    /// the whole capacity is inserted and then evicted immediately, together
    /// with everything older than it.
    pub fn insert(&mut self, key: impl Into<String>, value: ByteView) -> Option<ByteView> {
        let key = key.into();
        let previous = match self.index.get(key.as_str()).copied() {
            Some(id) => {
                self.order.move_to_front(id);
                let entry = self.order.get_mut(id)?;
                let old_size = entry.value.len() as u64;
                let new_size = value.len() as u64;
                let previous = std::mem::replace(&mut entry.value, value);
                self.used_bytes = self.used_bytes - old_size + new_size;
                Some(previous)
            },
            None => {
                self.used_bytes += entry_size(&key, &value);
                let id = self.order.push_front(Entry {
                    key: key.clone(),
                    value,
                });
                self.index.insert(key, id);
                None
            },
        };

        self.evict_overflow();

        #[cfg(debug_assertions)]
        self.debug_validate_invariants();

        previous
    }

    /// Returns the value for `key` and promotes it to MRU.
    pub fn get(&mut self, key: &str) -> Option<ByteView> {
        let id = *self.index.get(key)?;
        self.order.move_to_front(id);
        self.order.get(id).map(|entry| entry.value.clone())
    }

    /// Returns the value for `key` without changing recency order.
    pub fn peek(&self, key: &str) -> Option<ByteView> {
        let id = *self.index.get(key)?;
        self.order.get(id).map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Removes `key`, returning its value. The eviction callback is not
    /// invoked for explicit removals.
    pub fn remove(&mut self, key: &str) -> Option<ByteView> {
        let id = self.index.remove(key)?;
        let entry = self.order.remove(id)?;
        self.used_bytes -= entry.size();
        Some(entry.value)
    }

    /// Removes and returns the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<(String, ByteView)> {
        let entry = self.order.pop_back()?;
        self.index.remove(entry.key.as_str());
        self.used_bytes -= entry.size();
        Some((entry.key, entry.value))
    }

    /// Returns the least recently used entry without removing it.
    pub fn peek_lru(&self) -> Option<(&str, &ByteView)> {
        self.order
            .back()
            .map(|entry| (entry.key.as_str(), &entry.value))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes currently accounted to live entries.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    /// Configured capacity in bytes; 0 means unbounded.
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Number of entries evicted for capacity since creation.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            used_bytes: self.used_bytes,
            capacity_bytes: self.capacity_bytes,
            evictions: self.evictions,
        }
    }

    /// Keys from most to least recently used.
    pub fn keys_mru(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|entry| entry.key.as_str())
    }

    /// Drops every entry without invoking the eviction callback.
    pub fn clear(&mut self) {
        self.index.clear();
        self.order.clear();
        self.used_bytes = 0;
    }

    /// Verifies that the index, the recency list and the byte accounting
    /// agree with each other.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantError`] describing the first mismatch found.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if self.index.len() != self.order.len() {
            return Err(InvariantError::new(format!(
                "index has {} keys but recency list has {} nodes",
                self.index.len(),
                self.order.len()
            )));
        }

        let mut total = 0u64;
        for entry in self.order.iter() {
            match self.index.get(entry.key.as_str()) {
                Some(id) if self.order.get(*id).is_some_and(|e| e.key == entry.key) => {},
                _ => {
                    return Err(InvariantError::new(format!(
                        "list entry {:?} is not indexed",
                        entry.key
                    )));
                },
            }
            total += entry.size();
        }

        if total != self.used_bytes {
            return Err(InvariantError::new(format!(
                "used_bytes is {} but entries weigh {}",
                self.used_bytes, total
            )));
        }
        if self.capacity_bytes != 0 && self.used_bytes > self.capacity_bytes {
            return Err(InvariantError::new(format!(
                "used_bytes {} exceeds capacity {}",
                self.used_bytes, self.capacity_bytes
            )));
        }
        Ok(())
    }

    fn evict_overflow(&mut self) {
        while self.capacity_bytes != 0 && self.used_bytes > self.capacity_bytes {
            let Some(entry) = self.order.pop_back() else {
                break;
            };
            self.index.remove(entry.key.as_str());
            self.used_bytes -= entry.size();
            self.evictions += 1;
            tracing::trace!(key = %entry.key, bytes = entry.size(), "evicted lru entry");
            if let Some(on_evict) = self.on_evict.as_mut() {
                on_evict(entry.key, entry.value);
            }
        }
    }

    #[cfg(debug_assertions)]
    fn debug_validate_invariants(&self) {
        self.order.debug_validate_invariants();
        debug_assert_eq!(self.index.len(), self.order.len());
    }
}

impl fmt::Debug for ByteLruCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteLruCache")
            .field("len", &self.len())
            .field("used_bytes", &self.used_bytes)
            .field("capacity_bytes", &self.capacity_bytes)
            .field("evictions", &self.evictions)
            .finish()
    }
}

impl Default for ByteLruCache {
    /// Unbounded cache.
    fn default() -> Self {
        Self::new(0)
    }
}

/// Thread-safe wrapper around [`ByteLruCache`].
///
/// One `parking_lot::Mutex` guards the index and the recency list together,
/// so `insert`, `get` (which promotes) and eviction are each atomic. A read
/// lock would not help: every hit reorders the list.
pub struct ConcurrentByteLruCache {
    inner: Mutex<ByteLruCache>,
}

impl ConcurrentByteLruCache {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(ByteLruCache::new(capacity_bytes)),
        }
    }

    pub fn with_eviction_callback(capacity_bytes: u64, on_evict: EvictionCallback) -> Self {
        Self {
            inner: Mutex::new(ByteLruCache::with_eviction_callback(
                capacity_bytes,
                on_evict,
            )),
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: ByteView) -> Option<ByteView> {
        self.inner.lock().insert(key, value)
    }

    pub fn get(&self, key: &str) -> Option<ByteView> {
        self.inner.lock().get(key)
    }

    pub fn peek(&self, key: &str) -> Option<ByteView> {
        self.inner.lock().peek(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn remove(&self, key: &str) -> Option<ByteView> {
        self.inner.lock().remove(key)
    }

    pub fn pop_lru(&self) -> Option<(String, ByteView)> {
        self.inner.lock().pop_lru()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn used_bytes(&self) -> u64 {
        self.inner.lock().used_bytes()
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.inner.lock().capacity_bytes()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.inner.lock().check_invariants()
    }
}

impl fmt::Debug for ConcurrentByteLruCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentByteLruCache")
            .field("stats", &self.stats())
            .finish()
    }
}
