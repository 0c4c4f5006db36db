//! Commit graph traversal: arena-backed revision walking and merge-base search.
//!
//! This crate walks the DAG of commit objects reachable from a set of
//! starting points, in time order, topological order, or both combined with
//! a reversal, and finds common ancestors between commits. It knows nothing
//! about branches or tags by name; a caller that owns reference storage
//! resolves names to OIDs and hands them in through [`RefResolver`].

pub mod arena;
pub mod merge_base;
pub mod walk;

use git_hash::ObjectId;

pub use merge_base::{is_ancestor, merge_base, merge_base_many, merge_base_one};
pub use walk::{RevWalk, SortOrder, sort};

/// A name-to-OID lookup the walker consults for `push_ref`/`hide_ref`/`*_glob`.
///
/// Resolving reference storage (loose and packed refs, symbolic refs) is out
/// of scope for this crate; a caller that owns it implements this trait.
pub trait RefResolver {
    /// Resolve a single fully-qualified reference name to the object it points at.
    fn resolve(&self, name: &str) -> Option<ObjectId>;

    /// Resolve every reference name matching a glob pattern (e.g. `refs/heads/*`).
    fn iter_matching(&self, pattern: &str) -> Vec<ObjectId>;
}

#[derive(Debug, thiserror::Error)]
pub enum RevWalkError {
    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("commit not found: {0}")]
    CommitNotFound(ObjectId),

    #[error("object {0} is not a commit")]
    NotACommit(ObjectId),

    #[error("no merge base found")]
    NoMergeBase,

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Object(#[from] git_object::ObjectError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
