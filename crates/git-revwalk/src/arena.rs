//! The commit table backing a single walk.
//!
//! Every commit a walker touches is parsed once and interned here, keyed by
//! OID. Nodes never move once inserted, so parent lists can be stored by
//! value instead of chasing pointers back into the object database, and the
//! whole table is freed in one shot when the walker is dropped.

use git_hash::ObjectId;
use git_hash::collections::OidMap;
use git_object::Object;
use git_odb::ObjectDatabase;

use crate::RevWalkError;

/// Commit has been enqueued for output at least once.
pub const SEEN: u8 = 1 << 0;
/// Commit is excluded from output (reachable from a `hide`d tip).
pub const UNINTERESTING: u8 = 1 << 1;
/// Commit is queued for topological emission but still has unresolved children.
pub const TOPO_DELAY: u8 = 1 << 2;
/// Commit is reachable from the first merge-base input.
pub const PARENT1: u8 = 1 << 3;
/// Commit is reachable from a second merge-base input.
pub const PARENT2: u8 = 1 << 4;
/// Commit sits behind an already-reported merge base; skip its ancestors.
pub const STALE: u8 = 1 << 5;
/// Commit has been reported as a merge base.
pub const RESULT: u8 = 1 << 6;

/// A parsed commit plus the scratch flags the walk algorithms mutate in place.
pub struct CommitNode {
    pub parents: Vec<ObjectId>,
    pub tree: ObjectId,
    pub time: i64,
    pub flags: u8,
    pub in_degree: u32,
}

/// OID-keyed table of commit nodes, lazily populated from an object database.
pub struct CommitTable<'a> {
    odb: &'a ObjectDatabase,
    nodes: OidMap<CommitNode>,
}

impl<'a> CommitTable<'a> {
    pub fn new(odb: &'a ObjectDatabase) -> Self {
        Self {
            odb,
            nodes: OidMap::new(),
        }
    }

    /// Return the node for `oid`, parsing and interning it on first access.
    pub fn intern(&mut self, oid: ObjectId) -> Result<&mut CommitNode, RevWalkError> {
        if !self.nodes.contains_key(&oid) {
            let node = self.load(&oid)?;
            self.nodes.insert(oid, node);
        }
        Ok(self.nodes.get_mut(&oid).expect("just inserted"))
    }

    pub fn get(&self, oid: &ObjectId) -> Option<&CommitNode> {
        self.nodes.get(oid)
    }

    pub fn get_mut(&mut self, oid: &ObjectId) -> Option<&mut CommitNode> {
        self.nodes.get_mut(oid)
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.nodes.contains_key(oid)
    }

    /// Drop every flag back to zero, keeping parsed commit data cached.
    pub fn reset_flags(&mut self) {
        for node in self.nodes.values_mut() {
            node.flags = 0;
            node.in_degree = 0;
        }
    }

    fn load(&self, oid: &ObjectId) -> Result<CommitNode, RevWalkError> {
        let obj = self
            .odb
            .read(oid)?
            .ok_or(RevWalkError::CommitNotFound(*oid))?;
        match obj {
            Object::Commit(c) => Ok(CommitNode {
                parents: c.parents,
                tree: c.tree,
                time: c.committer.date.timestamp,
                flags: 0,
                in_degree: 0,
            }),
            _ => Err(RevWalkError::NotACommit(*oid)),
        }
    }
}
