//! Concurrent, size-bounded cache of raw and parsed objects keyed by hash.
//!
//! Raw and parsed forms of the same OID may coexist; a parsed entry always
//! wins on collision since it is strictly more useful to a caller. Eviction
//! samples victim slots at random rather than tracking recency, trading a
//! worse worst-case hit rate for a cache with no per-access bookkeeping.
//!
//! Reference counting is the payload `Arc`'s strong count: the cache itself
//! holds one reference, so a count of exactly one means nothing outside the
//! cache is still looking at the object and the slot may be reclaimed.

use std::sync::Arc;
use std::sync::Mutex;

use crossbeam::atomic::AtomicCell;
use git_hash::ObjectId;
use git_hash::collections::OidMap;

use crate::{Object, ObjectType};

/// Objects larger than this are never cached (commits and trees only; blobs
/// are never cached at any size).
pub const MAX_CACHEABLE_SIZE: usize = 4096;

/// Whether a cached entry holds undecoded bytes or a fully parsed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFlag {
    Raw,
    Parsed,
}

struct Entry {
    obj_type: ObjectType,
    size: usize,
    flags: CacheFlag,
    payload: Arc<Object>,
}

struct Inner {
    map: OidMap<Entry>,
    bytes_used: usize,
    seed: usize,
}

/// Counters exposed so a host can observe cache behavior without a logging
/// framework: how often lookups hit, how often eviction had to run, and how
/// often a full scan of the map found nothing evictable.
#[derive(Default)]
pub struct CacheStats {
    pub hits: AtomicCell<u64>,
    pub misses: AtomicCell<u64>,
    pub insertions: AtomicCell<u64>,
    pub evictions: AtomicCell<u64>,
    pub evict_attempts: AtomicCell<u64>,
    pub evict_failures: AtomicCell<u64>,
}

impl CacheStats {
    fn bump(counter: &AtomicCell<u64>) {
        counter.store(counter.load() + 1);
    }
}

/// Concurrent object cache with a caller-configured total-byte budget.
pub struct ObjectCache {
    inner: Mutex<Inner>,
    byte_limit: usize,
    stats: CacheStats,
}

impl ObjectCache {
    /// Create a cache that evicts once `byte_limit` bytes of cacheable
    /// payload would otherwise be exceeded.
    pub fn new(byte_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: OidMap::new(),
                bytes_used: 0,
                seed: 0,
            }),
            byte_limit,
            stats: CacheStats::default(),
        }
    }

    /// Insert `payload`, or upgrade an existing `Raw` entry to `Parsed`, or
    /// return the existing entry unchanged. Blobs and oversized commits/trees
    /// are silently not cached (the caller still gets its value back, just
    /// not stored). Always returns the `Arc` the caller now holds a reference
    /// through, whether freshly inserted, upgraded, or pre-existing.
    pub fn store(
        &self,
        oid: ObjectId,
        obj_type: ObjectType,
        flags: CacheFlag,
        payload: Object,
    ) -> Arc<Object> {
        let size = payload.serialize_content().len();
        if obj_type == ObjectType::Blob || size > MAX_CACHEABLE_SIZE {
            return Arc::new(payload);
        }

        let mut inner = self.inner.lock().unwrap();

        if let Some(existing) = inner.map.get_mut(&oid) {
            if existing.flags == CacheFlag::Raw && flags == CacheFlag::Parsed {
                let old_size = existing.size;
                let arc = Arc::new(payload);
                existing.payload = arc.clone();
                existing.size = size;
                existing.flags = CacheFlag::Parsed;
                inner.bytes_used = inner.bytes_used - old_size + size;
                return arc;
            }
            return existing.payload.clone();
        }

        while inner.bytes_used + size > self.byte_limit && !inner.map.is_empty() {
            if !self.evict_one(&mut inner) {
                CacheStats::bump(&self.stats.evict_failures);
                break;
            }
        }

        let arc = Arc::new(payload);
        inner.map.insert(
            oid,
            Entry {
                obj_type,
                size,
                flags,
                payload: arc.clone(),
            },
        );
        inner.bytes_used += size;
        CacheStats::bump(&self.stats.insertions);
        arc
    }

    /// Look up a cached entry by OID.
    pub fn get(&self, oid: &ObjectId) -> Option<Arc<Object>> {
        let inner = self.inner.lock().unwrap();
        let found = inner.map.get(oid).map(|e| e.payload.clone());
        if found.is_some() {
            CacheStats::bump(&self.stats.hits);
        } else {
            CacheStats::bump(&self.stats.misses);
        }
        found
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.inner.lock().unwrap().map.contains_key(oid)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.map.clear();
        inner.bytes_used = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().map.is_empty()
    }

    pub fn bytes_used(&self) -> usize {
        self.inner.lock().unwrap().bytes_used
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Evict one unreferenced entry by sampling slots starting at a rolling
    /// seed. Skips entries an external caller still holds an `Arc` to.
    /// Bails out (returns `false`) if a full scan finds nothing evictable.
    fn evict_one(&self, inner: &mut Inner) -> bool {
        let len = inner.map.len();
        if len == 0 {
            return false;
        }
        CacheStats::bump(&self.stats.evict_attempts);

        let keys: Vec<ObjectId> = inner.map.keys().copied().collect();
        let start = inner.seed % len;
        inner.seed = inner.seed.wrapping_add(1);

        for i in 0..len {
            let oid = keys[(start + i) % len];
            let evictable = inner
                .map
                .get(&oid)
                .map(|e| Arc::strong_count(&e.payload) == 1)
                .unwrap_or(false);
            if evictable {
                if let Some(entry) = inner.map.remove(&oid) {
                    inner.bytes_used = inner.bytes_used.saturating_sub(entry.size);
                }
                CacheStats::bump(&self.stats.evictions);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Blob, Commit, Tree};
    use git_utils::date::{GitDate, Signature};

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[0] = n;
        ObjectId::from_bytes(&bytes, git_hash::HashAlgorithm::Sha1).unwrap()
    }

    #[test]
    fn blobs_are_never_cached() {
        let cache = ObjectCache::new(1 << 20);
        let id = oid(1);
        cache.store(id, ObjectType::Blob, CacheFlag::Raw, Object::Blob(Blob::new(vec![1, 2, 3])));
        assert!(!cache.contains(&id));
    }

    #[test]
    fn store_then_get_roundtrips() {
        let cache = ObjectCache::new(1 << 20);
        let id = oid(2);
        cache.store(id, ObjectType::Tree, CacheFlag::Parsed, Object::Tree(Tree::new()));
        assert!(cache.get(&id).is_some());
    }

    #[test]
    fn parsed_upgrade_wins_over_raw() {
        let cache = ObjectCache::new(1 << 20);
        let id = oid(3);
        cache.store(id, ObjectType::Tree, CacheFlag::Raw, Object::Tree(Tree::new()));
        cache.store(id, ObjectType::Tree, CacheFlag::Parsed, Object::Tree(Tree::new()));
        let inner = cache.inner.lock().unwrap();
        assert_eq!(inner.map.get(&id).unwrap().flags, CacheFlag::Parsed);
    }

    #[test]
    fn oversized_entry_is_not_cached() {
        let cache = ObjectCache::new(1 << 20);
        let id = oid(4);
        let sig = Signature {
            name: "t".into(),
            email: "t@example.com".into(),
            date: GitDate {
                timestamp: 1,
                tz_offset: 0,
            },
        };
        let commit = Commit {
            tree: oid(0),
            parents: Vec::new(),
            author: sig.clone(),
            committer: sig,
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: vec![b'x'; MAX_CACHEABLE_SIZE + 1].into(),
        };
        cache.store(id, ObjectType::Commit, CacheFlag::Parsed, Object::Commit(commit));
        assert!(!cache.contains(&id));
    }

    #[test]
    fn referenced_entry_survives_eviction_pressure() {
        let cache = ObjectCache::new(1);
        let id = oid(5);
        let held = cache.store(id, ObjectType::Tree, CacheFlag::Parsed, Object::Tree(Tree::new()));

        // Any further insert must try to evict to stay under budget, but the
        // only entry is still referenced by `held`, so it should survive.
        let other = oid(6);
        cache.store(other, ObjectType::Tree, CacheFlag::Parsed, Object::Tree(Tree::new()));

        assert!(cache.contains(&id));
        drop(held);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = ObjectCache::new(1 << 20);
        cache.store(oid(7), ObjectType::Tree, CacheFlag::Parsed, Object::Tree(Tree::new()));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.bytes_used(), 0);
    }
}
