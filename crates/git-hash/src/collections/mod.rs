//! Specialized collections keyed or filled by [`crate::ObjectId`].

mod oid_array;
mod oid_map;
mod oid_set;

pub use oid_array::OidArray;
pub use oid_map::OidMap;
pub use oid_set::OidSet;
