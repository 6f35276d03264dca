//! peercache: a byte-bounded, peer-aware read-through cache.
//!
//! Values are organised into named [`Group`](group::Group)s. Each group owns
//! a byte-bounded LRU and a [`Loader`](traits::Loader) that produces values
//! on a miss. Concurrent misses for one key are coalesced into a single
//! load, and with a [`PeerPicker`](peers::PeerPicker) registered, misses for
//! keys owned by another node (by consistent hashing) are fetched from that
//! node instead of loaded locally.
//!
//! ```
//! use peercache::prelude::*;
//!
//! let registry = GroupRegistry::new();
//! let scores = registry.new_group("scores", 2 << 10, LoaderFn::new(|key: &str| {
//!     match key {
//!         "Tom" => Ok(b"630".to_vec()),
//!         _ => Err(format!("{key} not exist").into()),
//!     }
//! }));
//!
//! assert_eq!(scores.get("Tom").unwrap(), "630");
//! assert_eq!(scores.get("Sam").unwrap_err().to_string(), "Sam not exist");
//! assert!(scores.get("").unwrap_err().is_empty_key());
//! ```

pub mod builder;
pub mod ds;
pub mod error;
pub mod flight;
pub mod group;
pub mod peers;
pub mod policy;
pub mod prelude;
pub mod registry;
pub mod store;
pub mod traits;

pub use ds::{DEFAULT_REPLICAS, HashRing};
pub use flight::{FlightGroup, FlightRole};
pub use policy::{ByteLruCache, CacheStats, ConcurrentByteLruCache};
pub use store::ByteView;
