//! Name → group lookup.
//!
//! A [`GroupRegistry`] owns every [`Group`] of one node. It is an ordinary
//! value, so tests and embedders can run several independent nodes in one
//! process. Reads take a shared lock and may run concurrently; creating or
//! removing a group takes the exclusive lock briefly.
//!
//! The registry is also the server side of peer fetches: a transport hands
//! each incoming [`FetchRequest`] to [`GroupRegistry::serve`]. For
//! in-process clusters the registry itself implements [`PeerGetter`], so one
//! node's registry can be plugged straight into another node's picker.
//!
//! ```
//! use peercache::registry::GroupRegistry;
//! use peercache::traits::LoaderFn;
//!
//! let registry = GroupRegistry::new();
//! registry.new_group("scores", 2 << 10, LoaderFn::new(|key: &str| {
//!     Ok(key.len().to_string().into_bytes())
//! }));
//!
//! let scores = registry.get("scores").unwrap();
//! assert_eq!(scores.get("Tom").unwrap(), "3");
//! assert!(registry.get("missing").is_none());
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::GroupError;
use crate::group::Group;
use crate::peers::{FetchRequest, FetchResponse, PeerError, PeerGetter};
use crate::traits::Loader;

/// Registry of the groups hosted by one node.
#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<FxHashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a group and registers it under `name`, replacing any group
    /// already registered under that name.
    ///
    /// `capacity_bytes == 0` means the group's cache is unbounded.
    pub fn new_group<L>(&self, name: impl Into<String>, capacity_bytes: u64, loader: L) -> Arc<Group>
    where
        L: Loader + 'static,
    {
        let group = Group::new(name.into(), capacity_bytes, Arc::new(loader), None);
        self.insert(group)
    }

    pub(crate) fn insert(&self, group: Group) -> Arc<Group> {
        let group = Arc::new(group);
        let replaced = self
            .groups
            .write()
            .insert(group.name().to_owned(), Arc::clone(&group));
        if replaced.is_some() {
            tracing::debug!(group = group.name(), "replaced existing group");
        }
        group
    }

    /// Returns the group registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Unregisters and returns the group registered under `name`.
    ///
    /// Callers still holding the group can keep using it.
    pub fn remove(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.write().remove(name)
    }

    /// Registered group names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }

    /// Answers a peer's fetch request from the named group.
    ///
    /// # Errors
    ///
    /// [`GroupError::NoSuchGroup`] if no group is registered under
    /// `request.group`; otherwise whatever [`Group::get`] returns.
    pub fn serve(&self, request: &FetchRequest) -> Result<FetchResponse, GroupError> {
        let group = self
            .get(&request.group)
            .ok_or_else(|| GroupError::NoSuchGroup(request.group.clone()))?;
        let value = group.get(&request.key)?;
        Ok(FetchResponse {
            value: value.to_vec(),
        })
    }
}

impl PeerGetter for GroupRegistry {
    fn get(&self, group: &str, key: &str) -> Result<Vec<u8>, PeerError> {
        self.serve(&FetchRequest::new(group, key))
            .map(|response| response.value)
            .map_err(|err| PeerError::Remote(err.to_string()))
    }
}

impl fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("groups", &self.names())
            .finish()
    }
}
