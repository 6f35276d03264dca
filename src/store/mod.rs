//! Cached value representation.

pub mod byte_view;

pub use byte_view::ByteView;
