//! Error types for the peercache library.
//!
//! ## Key Components
//!
//! - [`GroupError`]: Returned by [`Group::get`](crate::group::Group::get) and
//!   the registry's serving path. Cloneable so that every caller joined on one
//!   coalesced load receives the same error.
//! - [`ConfigError`]: Returned when group or ring configuration is invalid
//!   (missing loader, zero ring replicas).
//! - [`InvariantError`]: Returned by `check_invariants` on the byte-bounded
//!   LRU when its accounting no longer matches its contents.
//!
//! Transport failures live next to the peer traits as
//! [`PeerError`](crate::peers::PeerError); the group never surfaces them,
//! it falls back to the local loader instead.
//!
//! ## Example Usage
//!
//! ```
//! use peercache::error::GroupError;
//!
//! let err = GroupError::load(std::io::Error::other("Sam not exist"));
//! assert_eq!(err.to_string(), "Sam not exist");
//! assert!(matches!(GroupError::EmptyKey, GroupError::EmptyKey));
//! ```

use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by loaders and transports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared error handle; cloning it does not clone the underlying error.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// GroupError
// ---------------------------------------------------------------------------

/// Errors surfaced by a cache group lookup.
#[derive(Debug, Clone, Error)]
pub enum GroupError {
    /// The lookup key was empty.
    #[error("key is required")]
    EmptyKey,

    /// The group's loader failed; displayed exactly as the loader reported it.
    #[error(transparent)]
    Load(SharedError),

    /// No group is registered under the requested name.
    #[error("no such group: {0}")]
    NoSuchGroup(String),

    /// A peer picker was already registered on this group.
    #[error("peers already registered for group {0}")]
    PeersAlreadyRegistered(String),
}

impl GroupError {
    /// Wraps a loader failure.
    pub fn load<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        GroupError::Load(Arc::new(err))
    }

    /// Returns `true` for the empty-key validation error.
    pub fn is_empty_key(&self) -> bool {
        matches!(self, GroupError::EmptyKey)
    }
}

impl From<BoxError> for GroupError {
    fn from(err: BoxError) -> Self {
        GroupError::Load(Arc::from(err))
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when configuration parameters are invalid.
///
/// Produced by fallible constructors such as
/// [`HashRing::try_new`](crate::ds::HashRing::try_new) and
/// [`GroupBuilder::try_build`](crate::builder::GroupBuilder::try_build).
///
/// # Example
///
/// ```
/// use peercache::ds::HashRing;
///
/// let err = HashRing::try_new(0).unwrap_err();
/// assert!(err.to_string().contains("replicas"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal cache invariants are violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvariantError(String);

impl InvariantError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
