//! Immutable view over a cached byte payload.
//!
//! A [`ByteView`] is what the cache stores and what [`Group::get`] hands
//! back. The payload is a reference-counted [`Bytes`] buffer, so clones are
//! O(1) and a view held by a caller stays valid after the entry it came from
//! is replaced or evicted. Nothing can mutate the bytes behind a view; the
//! owned accessor [`to_vec`](ByteView::to_vec) always returns a fresh copy.
//!
//! ```
//! use peercache::store::ByteView;
//!
//! let view = ByteView::copy_from_slice(b"630");
//! let mut raw = view.to_vec();
//! raw[0] = b'9';
//!
//! assert_eq!(view, "630");
//! assert_eq!(view.len(), 3);
//! ```
//!
//! [`Group::get`]: crate::group::Group::get

use std::fmt;

use bytes::Bytes;

/// Read-only, cheaply clonable byte payload.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    bytes: Bytes,
}

impl ByteView {
    /// Copies `data` into a new view.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(data),
        }
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns an owned copy of the payload.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Returns the payload as a shared `Bytes` handle without copying.
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// Borrows the payload.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Lossy UTF-8 rendering of the payload.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl From<Vec<u8>> for ByteView {
    /// Takes ownership of `bytes` without copying.
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
        }
    }
}

impl From<Bytes> for ByteView {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<&str> for ByteView {
    fn from(s: &str) -> Self {
        Self::copy_from_slice(s.as_bytes())
    }
}

impl From<String> for ByteView {
    fn from(s: String) -> Self {
        Self::from(s.into_bytes())
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq<[u8]> for ByteView {
    fn eq(&self, other: &[u8]) -> bool {
        self.bytes.as_ref() == other
    }
}

impl PartialEq<&[u8]> for ByteView {
    fn eq(&self, other: &&[u8]) -> bool {
        self.bytes.as_ref() == *other
    }
}

impl PartialEq<str> for ByteView {
    fn eq(&self, other: &str) -> bool {
        self.bytes.as_ref() == other.as_bytes()
    }
}

impl PartialEq<&str> for ByteView {
    fn eq(&self, other: &&str) -> bool {
        self.bytes.as_ref() == other.as_bytes()
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ByteView").field(&self.bytes).finish()
    }
}
