//! Named cache namespaces.
//!
//! A [`Group`] pairs a byte-bounded LRU with a [`Loader`] and, optionally, a
//! [`PeerPicker`]. [`Group::get`] is the whole read path:
//!
//! ```text
//!   get(key)
//!     │
//!     ├─ "" ──────────────────────────────► Err(EmptyKey)
//!     ├─ cache hit ───────────────────────► Ok(view)
//!     └─ miss ─► FlightGroup::execute(key)
//!                  │
//!                  ├─ peer picked ─► PeerGetter::get ─► Ok(view)   (not cached)
//!                  │                       │
//!                  │                       └─ PeerError ─► warn, fall through
//!                  │
//!                  └─ Loader::load ─► Ok(bytes) ─► cache.insert ─► Ok(view)
//!                                   └─ Err(e) ──────────────────► Err(Load(e))
//! ```
//!
//! Concurrent misses for one key share a single peer fetch or loader call;
//! every caller in the burst receives the same value or the same error.
//! Values fetched from a peer are returned to the caller but not stored
//! locally, so each key has exactly one caching owner.
//!
//! Groups are created through a [`GroupRegistry`](crate::registry::GroupRegistry)
//! or a [`GroupBuilder`](crate::builder::GroupBuilder).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::GroupError;
use crate::flight::{FlightGroup, FlightRole};
use crate::peers::{PeerError, PeerGetter, PeerPicker};
use crate::policy::byte_lru::{CacheStats, ConcurrentByteLruCache, EvictionCallback};
use crate::store::ByteView;
use crate::traits::Loader;

/// Counter snapshot for one group.
///
/// `loads` counts misses that entered the coalescer; `loads_deduped` counts
/// how many of those actually ran a fetch, so `loads - loads_deduped` is the
/// number of callers served by someone else's in-flight load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub gets: u64,
    pub hits: u64,
    pub loads: u64,
    pub loads_deduped: u64,
    pub local_loads: u64,
    pub local_load_errs: u64,
    pub peer_loads: u64,
    pub peer_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    gets: AtomicU64,
    hits: AtomicU64,
    loads: AtomicU64,
    loads_deduped: AtomicU64,
    local_loads: AtomicU64,
    local_load_errs: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    fn snapshot(&self) -> GroupStats {
        GroupStats {
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            loads_deduped: self.loads_deduped.load(Ordering::Relaxed),
            local_loads: self.local_loads.load(Ordering::Relaxed),
            local_load_errs: self.local_load_errs.load(Ordering::Relaxed),
            peer_loads: self.peer_loads.load(Ordering::Relaxed),
            peer_errors: self.peer_errors.load(Ordering::Relaxed),
        }
    }
}

/// A named cache namespace with its own loader and capacity.
pub struct Group {
    name: String,
    loader: Arc<dyn Loader>,
    cache: ConcurrentByteLruCache,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    flights: FlightGroup<Result<ByteView, GroupError>>,
    counters: Counters,
}

impl Group {
    pub(crate) fn new(
        name: String,
        capacity_bytes: u64,
        loader: Arc<dyn Loader>,
        on_evict: Option<EvictionCallback>,
    ) -> Self {
        let cache = match on_evict {
            Some(on_evict) => ConcurrentByteLruCache::with_eviction_callback(capacity_bytes, on_evict),
            None => ConcurrentByteLruCache::new(capacity_bytes),
        };
        Self {
            name,
            loader,
            cache,
            peers: OnceLock::new(),
            flights: FlightGroup::new(),
            counters: Counters::default(),
        }
    }

    /// Returns the value for `key`, loading it on a miss.
    ///
    /// # Errors
    ///
    /// - [`GroupError::EmptyKey`] if `key` is empty.
    /// - [`GroupError::Load`] carrying the loader's error, unchanged, if the
    ///   key is not cached, no peer supplied it, and the loader failed.
    pub fn get(&self, key: &str) -> Result<ByteView, GroupError> {
        if key.is_empty() {
            return Err(GroupError::EmptyKey);
        }
        bump(&self.counters.gets);

        if let Some(value) = self.cache.get(key) {
            bump(&self.counters.hits);
            tracing::debug!(group = %self.name, key, "cache hit");
            return Ok(value);
        }
        self.load(key)
    }

    /// Installs the picker used to route misses to other nodes.
    ///
    /// # Panics
    ///
    /// Panics if a picker is already registered on this group.
    pub fn register_peers(&self, picker: Arc<dyn PeerPicker>) {
        if let Err(err) = self.try_register_peers(picker) {
            panic!("{err}");
        }
    }

    /// Installs the peer picker, failing if one is already registered.
    pub fn try_register_peers(&self, picker: Arc<dyn PeerPicker>) -> Result<(), GroupError> {
        self.peers
            .set(picker)
            .map_err(|_| GroupError::PeersAlreadyRegistered(self.name.clone()))
    }

    pub fn has_peers(&self) -> bool {
        self.peers.get().is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.cache.capacity_bytes()
    }

    pub fn stats(&self) -> GroupStats {
        self.counters.snapshot()
    }

    /// Occupancy of the group's local cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Returns the locally cached value for `key` without loading or
    /// touching recency.
    pub fn peek(&self, key: &str) -> Option<ByteView> {
        self.cache.peek(key)
    }

    fn load(&self, key: &str) -> Result<ByteView, GroupError> {
        bump(&self.counters.loads);
        let (result, role) = self
            .flights
            .execute_with_role(key, || self.load_once(key));
        if role == FlightRole::Joined {
            tracing::debug!(group = %self.name, key, "joined in-flight load");
        }
        result
    }

    fn load_once(&self, key: &str) -> Result<ByteView, GroupError> {
        // A load that finished between our miss and claiming the flight has
        // already populated the cache.
        if let Some(value) = self.cache.get(key) {
            bump(&self.counters.hits);
            return Ok(value);
        }
        bump(&self.counters.loads_deduped);

        if let Some(peer) = self.peers.get().and_then(|picker| picker.pick_peer(key)) {
            match self.get_from_peer(peer.as_ref(), key) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    bump(&self.counters.peer_errors);
                    tracing::warn!(
                        group = %self.name,
                        key,
                        error = %err,
                        "failed to get from peer, loading locally"
                    );
                },
            }
        }
        self.get_locally(key)
    }

    fn get_from_peer(
        &self,
        peer: &dyn PeerGetter,
        key: &str,
    ) -> Result<ByteView, PeerError> {
        let bytes = peer.get(&self.name, key)?;
        bump(&self.counters.peer_loads);
        Ok(ByteView::from(bytes))
    }

    fn get_locally(&self, key: &str) -> Result<ByteView, GroupError> {
        tracing::debug!(group = %self.name, key, "loading from source");
        match self.loader.load(key) {
            Ok(bytes) => {
                bump(&self.counters.local_loads);
                let value = ByteView::from(bytes);
                self.cache.insert(key, value.clone());
                Ok(value)
            },
            Err(err) => {
                bump(&self.counters.local_load_errs);
                Err(GroupError::from(err))
            },
        }
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("cache", &self.cache)
            .field("has_peers", &self.has_peers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::traits::LoaderFn;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    fn db() -> HashMap<&'static str, &'static str> {
        HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")])
    }

    /// Loader over a fixed map that counts calls per key.
    fn counting_loader() -> (Arc<dyn Loader>, Arc<Mutex<HashMap<String, usize>>>) {
        let counts = Arc::new(Mutex::new(HashMap::new()));
        let seen = Arc::clone(&counts);
        let data = db();
        let loader = LoaderFn::new(move |key: &str| -> Result<Vec<u8>, BoxError> {
            *seen.lock().entry(key.to_string()).or_insert(0) += 1;
            data.get(key)
                .map(|v| v.as_bytes().to_vec())
                .ok_or_else(|| format!("{key} not exist").into())
        });
        (Arc::new(loader), counts)
    }

    fn group(capacity: u64) -> (Group, Arc<Mutex<HashMap<String, usize>>>) {
        let (loader, counts) = counting_loader();
        (Group::new("scores".into(), capacity, loader, None), counts)
    }

    struct FixedPicker(Option<Arc<dyn PeerGetter>>);

    impl PeerPicker for FixedPicker {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerGetter>> {
            self.0.clone()
        }
    }

    struct StaticPeer(Result<&'static str, &'static str>);

    impl PeerGetter for StaticPeer {
        fn get(&self, _group: &str, _key: &str) -> Result<Vec<u8>, PeerError> {
            match self.0 {
                Ok(v) => Ok(v.as_bytes().to_vec()),
                Err(reason) => Err(PeerError::Unreachable {
                    peer: "node-b".into(),
                    reason: reason.into(),
                }),
            }
        }
    }

    #[test]
    fn loads_once_then_hits() {
        let (group, counts) = group(2 << 10);
        for (key, value) in db() {
            assert_eq!(group.get(key).unwrap(), value);
            assert_eq!(group.get(key).unwrap(), value);
            assert_eq!(counts.lock()[key], 1, "cache miss on {key}");
        }
        let stats = group.stats();
        assert_eq!(stats.gets, 6);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.local_loads, 3);
    }

    #[test]
    fn unknown_key_errors_and_is_not_cached() {
        let (group, counts) = group(0);
        let err = group.get("unknown").unwrap_err();
        assert_eq!(err.to_string(), "unknown not exist");
        assert!(group.peek("unknown").is_none());
        assert_eq!(group.cache_stats().entries, 0);

        assert!(group.get("unknown").is_err());
        assert_eq!(counts.lock()["unknown"], 2);
        assert_eq!(group.stats().local_load_errs, 2);
    }

    #[test]
    fn empty_key_is_rejected_without_side_effects() {
        let (group, counts) = group(0);
        assert!(group.get("").unwrap_err().is_empty_key());
        assert!(counts.lock().is_empty());
        assert_eq!(group.stats(), GroupStats::default());
    }

    #[test]
    fn peer_values_are_returned_but_not_cached() {
        let (group, counts) = group(0);
        let peer: Arc<dyn PeerGetter> = Arc::new(StaticPeer(Ok("remote")));
        group.register_peers(Arc::new(FixedPicker(Some(peer))));

        assert_eq!(group.get("Tom").unwrap(), "remote");
        assert_eq!(group.get("Tom").unwrap(), "remote");
        assert!(group.peek("Tom").is_none());
        assert!(counts.lock().is_empty());
        assert_eq!(group.stats().peer_loads, 2);
    }

    #[test]
    fn peer_failure_falls_back_to_loader() {
        let (group, counts) = group(0);
        let peer: Arc<dyn PeerGetter> = Arc::new(StaticPeer(Err("connection refused")));
        group.register_peers(Arc::new(FixedPicker(Some(peer))));

        assert_eq!(group.get("Jack").unwrap(), "589");
        assert_eq!(counts.lock()["Jack"], 1);
        assert_eq!(group.peek("Jack").unwrap(), "589");
        let stats = group.stats();
        assert_eq!(stats.peer_errors, 1);
        assert_eq!(stats.local_loads, 1);
    }

    #[test]
    fn local_owner_uses_loader() {
        let (group, counts) = group(0);
        group.register_peers(Arc::new(FixedPicker(None)));
        assert_eq!(group.get("Sam").unwrap(), "567");
        assert_eq!(counts.lock()["Sam"], 1);
        assert_eq!(group.stats().peer_loads, 0);
    }

    #[test]
    fn try_register_peers_rejects_second_picker() {
        let (group, _) = group(0);
        assert!(!group.has_peers());
        group
            .try_register_peers(Arc::new(FixedPicker(None)))
            .unwrap();
        let err = group
            .try_register_peers(Arc::new(FixedPicker(None)))
            .unwrap_err();
        assert!(matches!(err, GroupError::PeersAlreadyRegistered(name) if name == "scores"));
    }

    #[test]
    #[should_panic(expected = "peers already registered")]
    fn register_peers_twice_panics() {
        let (group, _) = group(0);
        group.register_peers(Arc::new(FixedPicker(None)));
        group.register_peers(Arc::new(FixedPicker(None)));
    }

    #[test]
    fn small_capacity_evicts_least_recent() {
        // "Tom630" and "Jack589" fit; "Sam567" pushes out the LRU entry.
        let (group, counts) = group(13);
        group.get("Tom").unwrap();
        group.get("Jack").unwrap();
        group.get("Tom").unwrap();
        group.get("Sam").unwrap();

        assert!(group.peek("Jack").is_none());
        assert!(group.peek("Tom").is_some());
        assert_eq!(group.cache_stats().evictions, 1);
        group.get("Jack").unwrap();
        assert_eq!(counts.lock()["Jack"], 2);
    }

    #[test]
    fn held_view_is_isolated_from_later_cache_changes() {
        let (group, _) = group(13);
        let held = group.get("Tom").unwrap();

        group.cache.insert("Tom", ByteView::from("999"));
        assert_eq!(group.peek("Tom").unwrap(), "999");
        group.get("Jack").unwrap();
        group.get("Sam").unwrap();
        assert!(group.peek("Tom").is_none());

        assert_eq!(held, "630");
        assert_eq!(held.to_vec(), b"630".to_vec());
    }
}
