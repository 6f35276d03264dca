//! Peer selection and remote fetch.
//!
//! A [`Group`](crate::group::Group) with a registered [`PeerPicker`] asks
//! it, on every coalesced miss, whether some other node owns the key. If the
//! picker returns a [`PeerGetter`], the group fetches through it; any
//! [`PeerError`] makes the group fall back to its local loader.
//!
//! ```text
//!   pick_peer("Tom")
//!        │
//!        ▼
//!   ┌──────────────┐  owner == self_id  ──► None (load locally)
//!   │   HashRing   │
//!   └──────────────┘  owner == "node-b" ──► Some(getter for node-b)
//! ```
//!
//! [`RingPeerPicker`] is the stock picker: it places node ids on a
//! [`HashRing`] and maps each remote id to a getter. The transport itself is
//! left to the caller; a getter only has to turn a [`FetchRequest`] into
//! bytes. An in-process transport that serves straight out of a
//! [`GroupRegistry`](crate::registry::GroupRegistry) is provided by the
//! registry module.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ds::{DEFAULT_REPLICAS, HashFn, HashRing, crc32_ieee};
use crate::error::{BoxError, ConfigError};

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// A request for one key of one group on a remote node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FetchRequest {
    pub group: String,
    pub key: String,
}

impl FetchRequest {
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
        }
    }
}

/// The value bytes a remote node answered with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FetchResponse {
    pub value: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to obtain a value from a remote peer.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The peer could not be contacted.
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },

    /// The peer answered with an error of its own.
    #[error("peer returned error: {0}")]
    Remote(String),

    /// Any other transport failure.
    #[error(transparent)]
    Other(#[from] BoxError),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Client handle for one remote node.
pub trait PeerGetter: Send + Sync {
    /// Fetches `key` from the group named `group` on the remote node.
    fn get(&self, group: &str, key: &str) -> Result<Vec<u8>, PeerError>;

    /// Envelope form of [`get`](Self::get).
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, PeerError> {
        self.get(&request.group, &request.key)
            .map(|value| FetchResponse { value })
    }
}

impl<G: PeerGetter + ?Sized> PeerGetter for Arc<G> {
    fn get(&self, group: &str, key: &str) -> Result<Vec<u8>, PeerError> {
        (**self).get(group, key)
    }
}

/// Chooses the node that owns a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the getter for the remote owner of `key`, or `None` when the
    /// key belongs to this node or no peers are known.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

// ---------------------------------------------------------------------------
// RingPeerPicker
// ---------------------------------------------------------------------------

struct PeerSet<G> {
    ring: HashRing,
    getters: FxHashMap<String, Arc<G>>,
}

/// [`PeerPicker`] that routes keys over a consistent hash ring.
///
/// `self_id` must be the id under which this node appears in the peer set;
/// keys it owns are reported as local.
///
/// ```
/// use peercache::peers::{PeerError, PeerGetter, PeerPicker, RingPeerPicker};
///
/// struct Echo(&'static str);
///
/// impl PeerGetter for Echo {
///     fn get(&self, _group: &str, key: &str) -> Result<Vec<u8>, PeerError> {
///         Ok(format!("{}:{key}", self.0).into_bytes())
///     }
/// }
///
/// let picker = RingPeerPicker::new("node-a");
/// assert!(picker.pick_peer("Tom").is_none());
///
/// picker.set_peers([("node-b", Echo("node-b"))]);
/// // node-a is not on the ring, so every key is remote.
/// let peer = picker.pick_peer("Tom").unwrap();
/// assert_eq!(peer.get("scores", "Tom").unwrap(), b"node-b:Tom");
/// ```
pub struct RingPeerPicker<G> {
    self_id: String,
    replicas: usize,
    hash: HashFn,
    peers: RwLock<PeerSet<G>>,
}

impl<G: PeerGetter + 'static> RingPeerPicker<G> {
    /// Creates a picker with [`DEFAULT_REPLICAS`] positions per node.
    pub fn new(self_id: impl Into<String>) -> Self {
        Self::with_hasher(self_id, DEFAULT_REPLICAS, crc32_ieee)
    }

    /// Creates a picker with a custom replica count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `replicas` is zero.
    pub fn with_replicas(self_id: impl Into<String>, replicas: usize) -> Result<Self, ConfigError> {
        if replicas == 0 {
            return Err(ConfigError::new(
                "peer picker replicas must be greater than zero",
            ));
        }
        Ok(Self::with_hasher(self_id, replicas, crc32_ieee))
    }

    /// Creates a picker with a custom replica count and placement hash.
    pub fn with_hasher(self_id: impl Into<String>, replicas: usize, hash: HashFn) -> Self {
        Self {
            self_id: self_id.into(),
            replicas,
            hash,
            peers: RwLock::new(PeerSet {
                ring: HashRing::with_hasher(replicas, hash),
                getters: FxHashMap::default(),
            }),
        }
    }

    /// Replaces the whole peer set.
    ///
    /// The set may include this node's own id; its getter is never handed
    /// out. Concurrent `pick_peer` calls see either the old or the new set.
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = (S, G)>,
        S: Into<String>,
    {
        let mut ring = HashRing::with_hasher(self.replicas, self.hash);
        let mut getters = FxHashMap::default();
        for (id, getter) in peers {
            getters.insert(id.into(), Arc::new(getter));
        }
        ring.add(getters.keys());

        tracing::debug!(
            self_id = %self.self_id,
            peers = getters.len(),
            "peer set replaced"
        );
        *self.peers.write() = PeerSet { ring, getters };
    }

    /// This node's id.
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Id of the node that owns `key`, local or remote.
    pub fn owner_of(&self, key: &str) -> Option<String> {
        self.peers.read().ring.get(key).map(str::to_owned)
    }

    /// Number of nodes in the current peer set.
    pub fn peer_count(&self) -> usize {
        self.peers.read().getters.len()
    }
}

impl<G: PeerGetter + 'static> PeerPicker for RingPeerPicker<G> {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let peers = self.peers.read();
        let owner = peers.ring.get(key)?;
        if owner == self.self_id {
            return None;
        }
        tracing::trace!(key, peer = owner, "picked remote peer");
        let getter = peers.getters.get(owner)?;
        Some(Arc::clone(getter) as Arc<dyn PeerGetter>)
    }
}

impl<G> fmt::Debug for RingPeerPicker<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peers = self.peers.read();
        f.debug_struct("RingPeerPicker")
            .field("self_id", &self.self_id)
            .field("replicas", &self.replicas)
            .field("peers", &peers.getters.len())
            .finish()
    }
}
