//! Types needed to define groups, load values and wire peers together.

pub use crate::builder::GroupBuilder;
pub use crate::error::{BoxError, GroupError};
pub use crate::group::Group;
pub use crate::peers::{FetchRequest, PeerError, PeerGetter, PeerPicker, RingPeerPicker};
pub use crate::registry::GroupRegistry;
pub use crate::store::ByteView;
pub use crate::traits::{Loader, LoaderFn};
