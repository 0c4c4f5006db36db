//! Core revision walk iterator.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};

use git_hash::ObjectId;
use git_odb::ObjectDatabase;

use crate::RefResolver;
use crate::RevWalkError;
use crate::arena::{CommitTable, SEEN, TOPO_DELAY, UNINTERESTING};

/// Sort order as a combinable bitmask. `TIME` and `TOPOLOGICAL` select how
/// the walk visits commits; `REVERSE` buffers that order and plays it back
/// last-to-first. `TOPOLOGICAL | REVERSE` yields parents-before-children.
pub mod sort {
    pub const TIME: u8 = 1 << 0;
    pub const TOPOLOGICAL: u8 = 1 << 1;
    pub const REVERSE: u8 = 1 << 2;
}

/// Alias kept for call sites that prefer a named type over the raw bitmask.
pub type SortOrder = u8;

struct TimeEntry {
    oid: ObjectId,
    time: i64,
}

impl PartialEq for TimeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}
impl Eq for TimeEntry {}
impl PartialOrd for TimeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time.cmp(&other.time)
    }
}

/// Revision walk iterator over commits reachable from a set of tips.
pub struct RevWalk<'a> {
    table: CommitTable<'a>,
    sort: u8,
    roots: Vec<(ObjectId, bool)>,
    heap: BinaryHeap<TimeEntry>,
    topo_queue: Option<VecDeque<ObjectId>>,
    reverse_stack: Option<Vec<ObjectId>>,
    prepared: bool,
}

impl<'a> RevWalk<'a> {
    /// Create a walker reading commits from `odb`, defaulting to time order.
    pub fn new(odb: &'a ObjectDatabase) -> Self {
        Self {
            table: CommitTable::new(odb),
            sort: sort::TIME,
            roots: Vec::new(),
            heap: BinaryHeap::new(),
            topo_queue: None,
            reverse_stack: None,
            prepared: false,
        }
    }

    /// Add a starting commit (a positive tip).
    pub fn push(&mut self, oid: ObjectId) -> Result<(), RevWalkError> {
        self.roots.push((oid, false));
        self.enqueue_root(oid, false)
    }

    /// Exclude `oid` and everything reachable from it.
    pub fn hide(&mut self, oid: ObjectId) -> Result<(), RevWalkError> {
        self.roots.push((oid, true));
        self.enqueue_root(oid, true)
    }

    /// Resolve `name` through `resolver` and push it as a positive tip.
    pub fn push_ref(
        &mut self,
        resolver: &dyn RefResolver,
        name: &str,
    ) -> Result<(), RevWalkError> {
        match resolver.resolve(name) {
            Some(oid) => self.push(oid),
            None => Err(RevWalkError::InvalidRevision(name.to_string())),
        }
    }

    /// Resolve `name` through `resolver` and hide it.
    pub fn hide_ref(
        &mut self,
        resolver: &dyn RefResolver,
        name: &str,
    ) -> Result<(), RevWalkError> {
        match resolver.resolve(name) {
            Some(oid) => self.hide(oid),
            None => Err(RevWalkError::InvalidRevision(name.to_string())),
        }
    }

    /// Push every reference matching `pattern` (e.g. `refs/heads/*`) as a tip.
    pub fn push_glob(
        &mut self,
        resolver: &dyn RefResolver,
        pattern: &str,
    ) -> Result<(), RevWalkError> {
        for oid in resolver.iter_matching(pattern) {
            self.push(oid)?;
        }
        Ok(())
    }

    /// Hide every reference matching `pattern`.
    pub fn hide_glob(
        &mut self,
        resolver: &dyn RefResolver,
        pattern: &str,
    ) -> Result<(), RevWalkError> {
        for oid in resolver.iter_matching(pattern) {
            self.hide(oid)?;
        }
        Ok(())
    }

    /// Set the sort mode, a combination of [`sort::TIME`], [`sort::TOPOLOGICAL`]
    /// and [`sort::REVERSE`]. Must be called before the first call to `next`.
    pub fn set_sort(&mut self, sort: u8) {
        self.sort = sort;
    }

    /// Clear all walk state (but not the interned commit table) and re-seed
    /// from the tips previously passed to `push`/`hide`.
    pub fn reset(&mut self) -> Result<(), RevWalkError> {
        self.table.reset_flags();
        self.heap.clear();
        self.topo_queue = None;
        self.reverse_stack = None;
        self.prepared = false;
        let roots = std::mem::take(&mut self.roots);
        for (oid, hidden) in &roots {
            self.enqueue_root(*oid, *hidden)?;
        }
        self.roots = roots;
        Ok(())
    }

    fn enqueue_root(&mut self, oid: ObjectId, hide: bool) -> Result<(), RevWalkError> {
        self.mark(oid, hide)
    }

    /// Intern `oid`, mark it seen, and OR in `UNINTERESTING` if `hide` is set.
    /// Returns whether the commit was newly enqueued onto the time frontier.
    fn mark(&mut self, oid: ObjectId, hide: bool) -> Result<(), RevWalkError> {
        let node = self.table.intern(oid)?;
        let already_seen = node.flags & SEEN != 0;
        if hide {
            node.flags |= UNINTERESTING;
        }
        node.flags |= SEEN;
        let time = node.time;
        if !already_seen {
            self.heap.push(TimeEntry { oid, time });
        }
        Ok(())
    }

    /// Pop the next commit in time order, propagating `UNINTERESTING` to parents
    /// and skipping commits that turn out to be uninteresting themselves.
    fn next_time_raw(&mut self) -> Option<Result<ObjectId, RevWalkError>> {
        loop {
            let entry = self.heap.pop()?;
            let oid = entry.oid;
            let flags = match self.table.get(&oid) {
                Some(n) => n.flags,
                None => continue,
            };
            let uninteresting = flags & UNINTERESTING != 0;
            let parents = self
                .table
                .get(&oid)
                .map(|n| n.parents.clone())
                .unwrap_or_default();
            for parent in parents {
                if let Err(e) = self.mark(parent, uninteresting) {
                    return Some(Err(e));
                }
            }
            if !uninteresting {
                return Some(Ok(oid));
            }
        }
    }

    fn prepare_topo(&mut self) -> Result<(), RevWalkError> {
        let mut discovered = Vec::new();
        loop {
            match self.next_time_raw() {
                Some(Ok(oid)) => discovered.push(oid),
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        let discovered_set: HashSet<ObjectId> = discovered.iter().copied().collect();
        for oid in &discovered {
            let parents = self
                .table
                .get(oid)
                .map(|n| n.parents.clone())
                .unwrap_or_default();
            for parent in parents {
                if discovered_set.contains(&parent) {
                    if let Some(node) = self.table.get_mut(&parent) {
                        node.in_degree += 1;
                    }
                }
            }
        }

        let mut queue = VecDeque::new();
        for oid in &discovered {
            let node = self.table.get_mut(oid).expect("interned above");
            if node.in_degree == 0 {
                queue.push_back(*oid);
            } else {
                node.flags |= TOPO_DELAY;
            }
        }
        self.topo_queue = Some(queue);
        Ok(())
    }

    fn next_topo_raw(&mut self) -> Option<Result<ObjectId, RevWalkError>> {
        if self.topo_queue.is_none() {
            if let Err(e) = self.prepare_topo() {
                return Some(Err(e));
            }
        }
        let oid = self.topo_queue.as_mut()?.pop_front()?;
        let parents = self
            .table
            .get(&oid)
            .map(|n| n.parents.clone())
            .unwrap_or_default();
        for parent in parents {
            if let Some(node) = self.table.get_mut(&parent) {
                if node.in_degree == 0 {
                    continue;
                }
                node.in_degree -= 1;
                if node.in_degree == 0 && node.flags & TOPO_DELAY != 0 {
                    node.flags &= !TOPO_DELAY;
                    self.topo_queue.as_mut().unwrap().push_back(parent);
                }
            }
        }
        Some(Ok(oid))
    }

    fn next_unreversed(&mut self) -> Option<Result<ObjectId, RevWalkError>> {
        if self.sort & sort::TOPOLOGICAL != 0 {
            self.next_topo_raw()
        } else {
            self.next_time_raw()
        }
    }
}

impl Iterator for RevWalk<'_> {
    type Item = Result<ObjectId, RevWalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.prepared {
            self.prepared = true;
        }

        if self.sort & sort::REVERSE != 0 {
            if self.reverse_stack.is_none() {
                let mut buf = Vec::new();
                loop {
                    match self.next_unreversed() {
                        Some(Ok(oid)) => buf.push(oid),
                        Some(Err(e)) => return Some(Err(e)),
                        None => break,
                    }
                }
                self.reverse_stack = Some(buf);
            }
            return self.reverse_stack.as_mut().unwrap().pop().map(Ok);
        }

        self.next_unreversed()
    }
}
