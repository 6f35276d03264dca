//! Configured construction of cache groups.
//!
//! [`GroupRegistry::new_group`] covers the common case. The builder adds the
//! optional pieces: a peer picker registered before the group is published,
//! and an eviction callback on the group's cache.
//!
//! ## Example
//!
//! ```rust
//! use peercache::builder::GroupBuilder;
//! use peercache::registry::GroupRegistry;
//! use peercache::traits::LoaderFn;
//!
//! let registry = GroupRegistry::new();
//! let group = GroupBuilder::new("scores")
//!     .capacity_bytes(2 << 10)
//!     .loader(LoaderFn::new(|key: &str| Ok(key.as_bytes().to_vec())))
//!     .on_evict(|key, _value| println!("evicted {key}"))
//!     .build(&registry);
//!
//! assert_eq!(group.get("Tom").unwrap(), "Tom");
//! assert!(registry.get("scores").is_some());
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::group::Group;
use crate::peers::PeerPicker;
use crate::policy::byte_lru::EvictionCallback;
use crate::registry::GroupRegistry;
use crate::store::ByteView;
use crate::traits::Loader;

/// Plain-data part of a group's configuration.
///
/// With the `serde` feature enabled this can be read from any serde format;
/// missing fields take their [`Default`] values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct GroupConfig {
    /// Registry name of the group.
    pub name: String,
    /// Byte budget of the local cache; 0 disables eviction.
    pub capacity_bytes: u64,
}

impl GroupConfig {
    pub fn new(name: impl Into<String>, capacity_bytes: u64) -> Self {
        Self {
            name: name.into(),
            capacity_bytes,
        }
    }
}

/// Builder for [`Group`]s.
pub struct GroupBuilder {
    config: GroupConfig,
    loader: Option<Arc<dyn Loader>>,
    peers: Option<Arc<dyn PeerPicker>>,
    on_evict: Option<EvictionCallback>,
}

impl GroupBuilder {
    /// Starts a builder for an unbounded group named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(GroupConfig::new(name, 0))
    }

    pub fn from_config(config: GroupConfig) -> Self {
        Self {
            config,
            loader: None,
            peers: None,
            on_evict: None,
        }
    }

    /// Sets the cache's byte budget (0 = unbounded).
    pub fn capacity_bytes(mut self, capacity_bytes: u64) -> Self {
        self.config.capacity_bytes = capacity_bytes;
        self
    }

    /// Sets the source of truth for cache misses. Required.
    pub fn loader<L: Loader + 'static>(mut self, loader: L) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Uses an already shared loader.
    pub fn shared_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Registers `picker` on the group before it becomes visible.
    pub fn peers(mut self, picker: Arc<dyn PeerPicker>) -> Self {
        self.peers = Some(picker);
        self
    }

    /// Called once for every entry the cache evicts, in eviction order.
    ///
    /// Runs under the cache lock; it must not call back into the same group.
    pub fn on_evict<F>(mut self, on_evict: F) -> Self
    where
        F: FnMut(String, ByteView) + Send + 'static,
    {
        self.on_evict = Some(Box::new(on_evict));
        self
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Builds the group and registers it in `registry`, replacing any group
    /// of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if no loader was set or the name is empty.
    pub fn try_build(self, registry: &GroupRegistry) -> Result<Arc<Group>, ConfigError> {
        if self.config.name.is_empty() {
            return Err(ConfigError::new("group name is required"));
        }
        let Some(loader) = self.loader else {
            return Err(ConfigError::new(format!(
                "group {} requires a loader",
                self.config.name
            )));
        };

        let group = Group::new(
            self.config.name,
            self.config.capacity_bytes,
            loader,
            self.on_evict,
        );
        if let Some(picker) = self.peers {
            group.register_peers(picker);
        }
        Ok(registry.insert(group))
    }

    /// Builds and registers the group.
    ///
    /// # Panics
    ///
    /// Panics if [`try_build`](Self::try_build) would fail.
    pub fn build(self, registry: &GroupRegistry) -> Arc<Group> {
        match self.try_build(registry) {
            Ok(group) => group,
            Err(err) => panic!("{err}"),
        }
    }
}

impl fmt::Debug for GroupBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupBuilder")
            .field("config", &self.config)
            .field("has_loader", &self.loader.is_some())
            .field("has_peers", &self.peers.is_some())
            .field("has_on_evict", &self.on_evict.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::PeerGetter;
    use crate::traits::LoaderFn;
    use parking_lot::Mutex;

    fn echo() -> impl Loader {
        LoaderFn::new(|key: &str| Ok(key.as_bytes().to_vec()))
    }

    struct NoPeers;

    impl PeerPicker for NoPeers {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerGetter>> {
            None
        }
    }

    #[test]
    fn missing_loader_is_config_error() {
        let registry = GroupRegistry::new();
        let err = GroupBuilder::new("scores").try_build(&registry).unwrap_err();
        assert!(err.message().contains("requires a loader"));
        assert!(registry.is_empty());
    }

    #[test]
    #[should_panic(expected = "requires a loader")]
    fn build_without_loader_panics() {
        let registry = GroupRegistry::new();
        GroupBuilder::new("scores").build(&registry);
    }

    #[test]
    fn empty_name_is_config_error() {
        let registry = GroupRegistry::new();
        let err = GroupBuilder::new("")
            .loader(echo())
            .try_build(&registry)
            .unwrap_err();
        assert_eq!(err.message(), "group name is required");
    }

    #[test]
    fn builds_configured_group() {
        let registry = GroupRegistry::new();
        let group = GroupBuilder::from_config(GroupConfig::new("scores", 64))
            .loader(echo())
            .peers(Arc::new(NoPeers))
            .build(&registry);

        assert_eq!(group.name(), "scores");
        assert_eq!(group.capacity_bytes(), 64);
        assert!(group.has_peers());
        assert!(Arc::ptr_eq(&group, &registry.get("scores").unwrap()));
    }

    #[test]
    fn eviction_callback_sees_evicted_entries() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let registry = GroupRegistry::new();
        // Each echo entry is key + value, so "aa" costs 4 bytes.
        let group = GroupBuilder::new("echo")
            .capacity_bytes(8)
            .loader(echo())
            .on_evict(move |key: String, value: ByteView| sink.lock().push((key, value)))
            .build(&registry);

        group.get("aa").unwrap();
        group.get("bb").unwrap();
        group.get("cc").unwrap();

        let evicted = evicted.lock();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, "aa");
        assert_eq!(evicted[0].1, "aa");
    }

    #[test]
    fn shared_loader_backs_several_groups() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let loader: Arc<dyn Loader> = Arc::new(LoaderFn::new(move |key: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(key.as_bytes().to_vec())
        }));
        let registry = GroupRegistry::new();
        let hot = GroupBuilder::new("hot")
            .shared_loader(Arc::clone(&loader))
            .build(&registry);
        let cold = GroupBuilder::new("cold")
            .shared_loader(Arc::clone(&loader))
            .build(&registry);

        assert_eq!(hot.get("k").unwrap(), "k");
        assert_eq!(cold.get("k").unwrap(), "k");
        assert_eq!(hot.get("k").unwrap(), "k");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(Arc::strong_count(&loader), 3);
    }

    #[test]
    fn default_config_is_unbounded() {
        let config = GroupConfig::default();
        assert_eq!(config.capacity_bytes, 0);
        assert!(config.name.is_empty());
    }
}
