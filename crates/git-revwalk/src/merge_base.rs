//! Merge base computation using the paint algorithm.
//!
//! Commits reachable from `a` are painted `PARENT1`, commits reachable from
//! any of `bs` are painted `PARENT2`. A commit painted with both becomes a
//! `RESULT` and its parents are marked `STALE` so the walk never reports an
//! ancestor of an already-found base.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use git_hash::ObjectId;
use git_odb::ObjectDatabase;

use crate::RevWalkError;
use crate::arena::{CommitTable, PARENT1, PARENT2, RESULT, STALE};

struct PaintEntry {
    oid: ObjectId,
    date: i64,
}

impl PartialEq for PaintEntry {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}

impl Eq for PaintEntry {}

impl PartialOrd for PaintEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PaintEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap by date: process the newest frontier commit first.
        self.date.cmp(&other.date)
    }
}

/// Find the merge bases of `a` against a single other commit `b`.
pub fn merge_base(
    odb: &ObjectDatabase,
    a: &ObjectId,
    b: &ObjectId,
) -> Result<Vec<ObjectId>, RevWalkError> {
    merge_base_many(odb, a, std::slice::from_ref(b))
}

/// Find the merge bases of `a` against several other commits at once.
///
/// A result is a commit reachable from `a` and from every commit in `bs`
/// that is not itself an ancestor of another such commit.
pub fn merge_base_many(
    odb: &ObjectDatabase,
    a: &ObjectId,
    bs: &[ObjectId],
) -> Result<Vec<ObjectId>, RevWalkError> {
    if bs.iter().any(|b| b == a) {
        return Ok(vec![*a]);
    }

    let mut table = CommitTable::new(odb);
    let results = paint_down_to_common(&mut table, a, bs)?;
    remove_redundant(&mut table, results)
}

/// Find a single merge base, if any, of `a` and `b`.
pub fn merge_base_one(
    odb: &ObjectDatabase,
    a: &ObjectId,
    b: &ObjectId,
) -> Result<Option<ObjectId>, RevWalkError> {
    Ok(merge_base(odb, a, b)?.into_iter().next())
}

/// True if `ancestor` is reachable from `descendant`.
pub fn is_ancestor(
    odb: &ObjectDatabase,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> Result<bool, RevWalkError> {
    if ancestor == descendant {
        return Ok(true);
    }
    Ok(merge_base(odb, ancestor, descendant)?.contains(ancestor))
}

fn paint_down_to_common(
    table: &mut CommitTable,
    a: &ObjectId,
    bs: &[ObjectId],
) -> Result<Vec<ObjectId>, RevWalkError> {
    let mut queue: BinaryHeap<PaintEntry> = BinaryHeap::new();

    let node = table.intern(*a)?;
    node.flags |= PARENT1;
    queue.push(PaintEntry {
        oid: *a,
        date: node.time,
    });

    for b in bs {
        let node = table.intern(*b)?;
        node.flags |= PARENT2;
        queue.push(PaintEntry {
            oid: *b,
            date: node.time,
        });
    }

    let mut results = Vec::new();

    while let Some(entry) = queue.pop() {
        let flags = table.get(&entry.oid).map(|n| n.flags).unwrap_or(0);
        if flags & STALE != 0 {
            continue;
        }

        if flags & (PARENT1 | PARENT2) == (PARENT1 | PARENT2) && flags & RESULT == 0 {
            if let Some(node) = table.get_mut(&entry.oid) {
                node.flags |= RESULT;
            }
            results.push(entry.oid);
        }
        let flags = table.get(&entry.oid).map(|n| n.flags).unwrap_or(0);
        let became_result = flags & RESULT != 0;

        let parents = table
            .get(&entry.oid)
            .map(|n| n.parents.clone())
            .unwrap_or_default();
        for parent in parents {
            let mut propagate = flags & (PARENT1 | PARENT2 | RESULT);
            if became_result {
                propagate |= STALE;
            }
            let parent_node = table.intern(parent)?;
            let before = parent_node.flags;
            let after = before | propagate;
            if after != before {
                parent_node.flags = after;
                let date = parent_node.time;
                queue.push(PaintEntry { oid: parent, date });
            }
        }
    }

    Ok(results)
}

/// Drop any result that is itself an ancestor of another result.
fn remove_redundant(
    table: &mut CommitTable,
    bases: Vec<ObjectId>,
) -> Result<Vec<ObjectId>, RevWalkError> {
    if bases.len() <= 1 {
        return Ok(bases);
    }

    let mut dropped = vec![false; bases.len()];
    for i in 0..bases.len() {
        if dropped[i] {
            continue;
        }
        for j in (i + 1)..bases.len() {
            if dropped[j] {
                continue;
            }
            if is_ancestor_direct(table, &bases[i], &bases[j])? {
                dropped[i] = true;
                break;
            } else if is_ancestor_direct(table, &bases[j], &bases[i])? {
                dropped[j] = true;
            }
        }
    }

    Ok(bases
        .into_iter()
        .zip(dropped)
        .filter(|(_, d)| !d)
        .map(|(oid, _)| oid)
        .collect())
}

/// Plain BFS ancestor check, independent of the paint flags above.
fn is_ancestor_direct(
    table: &mut CommitTable,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> Result<bool, RevWalkError> {
    if ancestor == descendant {
        return Ok(true);
    }

    let mut queue = std::collections::VecDeque::new();
    let mut visited = std::collections::HashSet::new();
    queue.push_back(*descendant);
    visited.insert(*descendant);

    while let Some(current) = queue.pop_front() {
        if current == *ancestor {
            return Ok(true);
        }
        let parents = table.intern(current)?.parents.clone();
        for parent in parents {
            if visited.insert(parent) {
                queue.push_back(parent);
            }
        }
    }

    Ok(false)
}
