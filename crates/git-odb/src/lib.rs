//! Unified object database for git.
//!
//! Provides a single interface to read and write objects across loose storage,
//! packfiles, and alternate object databases. This is the primary abstraction
//! that all higher-level git operations use to access objects.

pub mod alternates;
pub mod backend;
pub mod prefix;
mod search;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git_hash::{HashAlgorithm, ObjectId};
use git_loose::LooseObjectStore;
use git_object::{Object, ObjectType};
use git_object::cache::{CacheFlag, ObjectCache};
use git_pack::window::WindowManager;

pub use backend::{OdbBackend, PackBackend};
pub use error::OdbError;

/// Consultation priority for the pack backend within one [`ObjectDatabase`];
/// below [`git_loose::LooseObjectStore`]'s `OdbBackend::priority` (100), so
/// loose objects are always tried first within a single database.
const PACK_PRIORITY: i32 = 50;

mod error {
    use std::path::PathBuf;

    use git_hash::ObjectId;

    #[derive(Debug, thiserror::Error)]
    pub enum OdbError {
        #[error("object not found: {0}")]
        NotFound(ObjectId),

        #[error("ambiguous object name: {prefix} matches {count} objects")]
        Ambiguous { prefix: String, count: usize },

        #[error("corrupt object {oid}: {reason}")]
        Corrupt { oid: ObjectId, reason: String },

        #[error("alternates error: {0}")]
        Alternates(String),

        #[error("circular alternates chain detected at {0}")]
        CircularAlternates(PathBuf),

        #[error(transparent)]
        Loose(#[from] git_loose::LooseError),

        #[error(transparent)]
        Pack(#[from] git_pack::PackError),

        #[error(transparent)]
        Io(#[from] std::io::Error),
    }
}

/// Default total-byte budget for the object cache. Caller-configurable via
/// [`ObjectDatabase::open_with_cache_budget`].
pub const DEFAULT_CACHE_BYTES: usize = 8 * 1024 * 1024;

/// Lightweight object info (header only, no content).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub obj_type: ObjectType,
    pub size: usize,
}

/// Unified object database providing access across all storage backends.
pub struct ObjectDatabase {
    /// Loose object store.
    loose: LooseObjectStore,
    /// Pack backend: the set of open packs under this database's
    /// `objects/pack` directory, with its own rescan and ordering.
    pack_backend: PackBackend,
    /// Alternate object databases.
    alternates: Vec<ObjectDatabase>,
    /// Object cache.
    cache: ObjectCache,
    /// Shared window manager: every pack this database (and its alternates)
    /// opens maps through it, so the byte budget is enforced across all of
    /// them together rather than per pack.
    windows: Arc<WindowManager>,
    /// Path to the objects directory.
    objects_dir: PathBuf,
    /// Hash algorithm in use.
    hash_algo: HashAlgorithm,
}

impl ObjectDatabase {
    /// Open the object database at the given objects directory.
    pub fn open(objects_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        Self::open_with_algo(objects_dir, HashAlgorithm::Sha1)
    }

    /// Open the object database with a specific hash algorithm.
    pub fn open_with_algo(
        objects_dir: impl AsRef<Path>,
        hash_algo: HashAlgorithm,
    ) -> Result<Self, OdbError> {
        Self::open_with_cache_budget(objects_dir, hash_algo, DEFAULT_CACHE_BYTES)
    }

    /// Open the object database with a specific hash algorithm and object
    /// cache byte budget.
    pub fn open_with_cache_budget(
        objects_dir: impl AsRef<Path>,
        hash_algo: HashAlgorithm,
        cache_bytes: usize,
    ) -> Result<Self, OdbError> {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        let windows = Arc::new(WindowManager::new());
        let loose = LooseObjectStore::open(&objects_dir, hash_algo);
        let pack_backend = PackBackend::open(&objects_dir, windows.clone(), PACK_PRIORITY)?;
        let alternates = alternates::load_alternates(&objects_dir, hash_algo, &windows)?;

        Ok(Self {
            loose,
            pack_backend,
            alternates,
            cache: ObjectCache::new(cache_bytes),
            windows,
            objects_dir,
            hash_algo,
        })
    }

    /// The shared window manager packs in this database (and its
    /// alternates) map through.
    pub fn window_manager(&self) -> &Arc<WindowManager> {
        &self.windows
    }

    /// Read an object by OID (searches loose -> packs -> alternates).
    pub fn read(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
        search::find_object(self, oid)
    }

    /// Read an object with caching. Parsed objects are stored so a later
    /// call that only needs the header skips re-reading storage entirely.
    pub fn read_cached(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
        if let Some(obj) = self.cache.get(oid) {
            return Ok(Some((*obj).clone()));
        }

        let obj = self.read(oid)?;
        if let Some(obj) = obj {
            let cached = self
                .cache
                .store(*oid, obj.object_type(), CacheFlag::Parsed, obj);
            Ok(Some((*cached).clone()))
        } else {
            Ok(None)
        }
    }

    /// Cache statistics (hit rate, eviction bail-outs) for a host to expose.
    pub fn cache_stats(&self) -> &git_object::cache::CacheStats {
        self.cache.stats()
    }

    /// Read just the header (type + size) without full content.
    pub fn read_header(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        search::find_header(self, oid)
    }

    /// Check if an object exists (fast, no decompression for packed objects).
    pub fn contains(&self, oid: &ObjectId) -> bool {
        search::object_exists(self, oid)
    }

    /// Write a new object (always to loose store).
    pub fn write(&self, obj: &Object) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write(obj)?)
    }

    /// Write raw content with type (always to loose store).
    pub fn write_raw(
        &self,
        obj_type: ObjectType,
        content: &[u8],
    ) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write_raw(obj_type, content)?)
    }

    /// Resolve an OID prefix to a full OID.
    /// Returns error if prefix is ambiguous.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectId, OdbError> {
        prefix::resolve_prefix(self, prefix)
    }

    /// Force a rescan of the pack directory (normally triggered lazily on
    /// the next query once the directory's mtime has moved). Call after a
    /// gc/repack when a caller needs the new packs visible immediately.
    pub fn refresh(&self) -> Result<(), OdbError> {
        self.pack_backend.refresh()
    }

    /// Iterate over all known object OIDs (for fsck/gc).
    pub fn iter_all_oids(
        &self,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectId, OdbError>> + '_>, OdbError> {
        let loose_iter = self.loose.iter()?.map(|r| r.map_err(OdbError::from));

        let pack_oids: Vec<Result<ObjectId, OdbError>> = self
            .pack_backend
            .iter_index_oids()?
            .into_iter()
            .map(Ok)
            .collect();

        let alt_oids: Vec<Result<ObjectId, OdbError>> = self
            .alternates
            .iter()
            .flat_map(|alt| match alt.iter_all_oids() {
                Ok(iter) => iter.collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            })
            .collect();

        Ok(Box::new(
            loose_iter
                .chain(pack_oids)
                .chain(alt_oids),
        ))
    }

    /// Get the path to the objects directory.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// Get the hash algorithm in use.
    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }
}
