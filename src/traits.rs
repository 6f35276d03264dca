//! # Loader Trait
//!
//! A [`Loader`] is the source of truth a cache group falls back to when a
//! key is neither cached locally nor owned by a reachable peer. The cache
//! treats it as an opaque function of the key: a database query, a file
//! read, a computation.
//!
//! ```text
//!   Group::get(key)
//!        │
//!        ├── cache hit ─────────────────────────────► ByteView
//!        │
//!        └── miss ──► FlightGroup ──► peer? ──► PeerGetter::get
//!                                      │
//!                                      └─ local / peer failed
//!                                              │
//!                                              ▼
//!                                       Loader::load(key) ──► Vec<u8>
//! ```
//!
//! ## Implementing
//!
//! Either implement the trait on your own type, or hand a closure to
//! [`LoaderFn`]:
//!
//! ```
//! use peercache::traits::{Loader, LoaderFn};
//!
//! let echo = LoaderFn::new(|key: &str| Ok(key.as_bytes().to_vec()));
//! assert_eq!(echo.load("key").unwrap(), b"key");
//! ```
//!
//! Loaders are invoked at most once per coalesced miss and may run
//! concurrently for different keys, so they must be `Send + Sync`.

use std::fmt;

use crate::error::BoxError;

/// Source of values for keys the cache does not hold.
pub trait Loader: Send + Sync {
    /// Produces the bytes for `key`, or an error that is surfaced verbatim to
    /// every caller waiting on this key.
    fn load(&self, key: &str) -> Result<Vec<u8>, BoxError>;
}

/// Adapter that lets a plain function or closure act as a [`Loader`].
#[derive(Clone)]
pub struct LoaderFn<F>(F);

impl<F> LoaderFn<F>
where
    F: Fn(&str) -> Result<Vec<u8>, BoxError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        LoaderFn(f)
    }
}

impl<F> Loader for LoaderFn<F>
where
    F: Fn(&str) -> Result<Vec<u8>, BoxError> + Send + Sync,
{
    #[inline]
    fn load(&self, key: &str) -> Result<Vec<u8>, BoxError> {
        (self.0)(key)
    }
}

impl<F> fmt::Debug for LoaderFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoaderFn")
    }
}

impl<L: Loader + ?Sized> Loader for std::sync::Arc<L> {
    fn load(&self, key: &str) -> Result<Vec<u8>, BoxError> {
        (**self).load(key)
    }
}
