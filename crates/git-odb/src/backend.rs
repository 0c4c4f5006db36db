//! Pluggable object storage backend trait.
//!
//! Backends are modeled as an explicit capability record rather than a fixed
//! pair of concrete fields on [`crate::ObjectDatabase`] — tagged variants
//! instead of inheritance, same spirit as the closed [`git_object::Object`]
//! union but applied to an intentionally open set.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use git_hash::ObjectId;
use git_object::{Object, ObjectType};
use git_pack::pack::PackFile;
use git_pack::window::WindowManager;

use crate::OdbError;

/// Trait for pluggable object storage backends.
///
/// Implementations provide access to objects in a specific storage format
/// (loose files, packfiles, etc.).
pub trait OdbBackend: Send + Sync {
    /// Read an object by OID.
    fn read(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError>;

    /// Read just the header (type + size).
    fn read_header(&self, oid: &ObjectId) -> Result<Option<(ObjectType, usize)>, OdbError>;

    /// Check if an object exists.
    fn contains(&self, oid: &ObjectId) -> bool;

    /// Write an object, returning its OID.
    fn write(&self, obj: &Object) -> Result<ObjectId, OdbError>;

    /// Find all OIDs matching the given hex prefix.
    fn lookup_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError>;

    /// Re-examine backing storage for changes (new/removed packs, etc).
    /// Backends with nothing to rescan leave this at the default no-op.
    fn refresh(&self) -> Result<(), OdbError> {
        Ok(())
    }

    /// Consultation order among backends of the same [`crate::ObjectDatabase`];
    /// higher values are tried first.
    fn priority(&self) -> i32;
}

/// OdbBackend implementation for loose object storage.
impl OdbBackend for git_loose::LooseObjectStore {
    fn read(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
        Ok(self.read(oid)?)
    }

    fn read_header(&self, oid: &ObjectId) -> Result<Option<(ObjectType, usize)>, OdbError> {
        Ok(self.read_header(oid)?)
    }

    fn contains(&self, oid: &ObjectId) -> bool {
        self.contains(oid)
    }

    fn write(&self, obj: &Object) -> Result<ObjectId, OdbError> {
        Ok(self.write(obj)?)
    }

    fn lookup_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError> {
        let mut matches = Vec::new();
        if let Ok(iter) = self.iter() {
            for result in iter {
                let oid = result?;
                if oid.starts_with_hex(prefix) {
                    matches.push(oid);
                }
            }
        }
        Ok(matches)
    }

    // Loose objects are read straight off the fan-out directories on every
    // call; there's no directory listing cached here that would go stale.
    fn priority(&self) -> i32 {
        100
    }
}

/// Manages the set of open packs under a single `objects/pack` directory:
/// discovery, mtime-triggered rescans, `(local_first, -mtime)` ordering, and
/// a `last_found` fast path.
///
/// `local_first` falls out of structure rather than a field here: a local
/// [`crate::ObjectDatabase`]'s own `PackBackend` is always consulted before
/// its alternates', so ordering peer packs by `-mtime` is enough to
/// reproduce the full `(local_first, -mtime)` order for this backend alone.
pub struct PackBackend {
    pack_dir: PathBuf,
    windows: Arc<WindowManager>,
    packs: RwLock<Vec<PackFile>>,
    dir_mtime: RwLock<Option<SystemTime>>,
    last_found: RwLock<Option<usize>>,
    priority: i32,
}

impl PackBackend {
    pub fn open(
        objects_dir: &Path,
        windows: Arc<WindowManager>,
        priority: i32,
    ) -> Result<Self, OdbError> {
        let backend = Self {
            pack_dir: objects_dir.join("pack"),
            windows,
            packs: RwLock::new(Vec::new()),
            dir_mtime: RwLock::new(None),
            last_found: RwLock::new(None),
            priority,
        };
        backend.refresh()?;
        Ok(backend)
    }

    fn current_mtime(&self) -> Option<SystemTime> {
        self.pack_dir.metadata().ok()?.modified().ok()
    }

    /// Rescan is eventually consistent: a pack written between the last
    /// observed mtime and now is missed until the directory's mtime itself
    /// ticks forward, which on some filesystems only has second resolution.
    fn rescan_if_stale(&self) -> Result<(), OdbError> {
        let observed = self.current_mtime();
        let stale = *self.dir_mtime.read().unwrap() != observed;
        if !stale {
            return Ok(());
        }
        self.rescan()?;
        *self.dir_mtime.write().unwrap() = observed;
        Ok(())
    }

    fn rescan(&self) -> Result<(), OdbError> {
        let mut entries: Vec<_> = match std::fs::read_dir(&self.pack_dir) {
            Ok(dir) => dir.filter_map(|e| e.ok()).collect(),
            Err(_) => {
                *self.packs.write().unwrap() = Vec::new();
                *self.last_found.write().unwrap() = None;
                return Ok(());
            }
        };

        entries.sort_by(|a, b| {
            let a_time = a.metadata().and_then(|m| m.modified()).ok();
            let b_time = b.metadata().and_then(|m| m.modified()).ok();
            b_time.cmp(&a_time)
        });

        let mut packs = Vec::new();
        for entry in entries {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "pack") {
                match PackFile::open_shared(
                    &path,
                    self.windows.clone(),
                    git_pack::MAX_DELTA_CHAIN_DEPTH,
                ) {
                    Ok(pack) => packs.push(pack),
                    Err(_) => continue,
                }
            }
        }

        *self.packs.write().unwrap() = packs;
        *self.last_found.write().unwrap() = None;
        Ok(())
    }

    /// Read an object, trying `last_found` first and resolving delta bases
    /// against this backend's own packs plus an optional outside fallback
    /// (loose storage, typically — a thin pack may reference a base that
    /// never made it into any pack).
    pub(crate) fn read_object_resolving(
        &self,
        oid: &ObjectId,
        fallback: &dyn Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<Option<git_pack::PackedObject>, OdbError> {
        self.rescan_if_stale()?;
        let packs = self.packs.read().unwrap();
        if packs.is_empty() {
            return Ok(None);
        }

        let resolve_base = |pack: &PackFile, base_oid: &ObjectId| -> Option<(ObjectType, Vec<u8>)> {
            for other in packs.iter() {
                if std::ptr::eq(other, pack) {
                    continue;
                }
                if let Ok(Some(packed)) = other.read_object(base_oid) {
                    return Some((packed.obj_type, packed.data));
                }
            }
            fallback(base_oid)
        };

        let last = *self.last_found.read().unwrap();
        if let Some(idx) = last {
            if let Some(pack) = packs.get(idx) {
                let resolver = |base: &ObjectId| resolve_base(pack, base);
                if let Some(packed) = pack.read_object_with_resolver(oid, resolver)? {
                    return Ok(Some(packed));
                }
            }
        }

        for (idx, pack) in packs.iter().enumerate() {
            if last == Some(idx) {
                continue;
            }
            let resolver = |base: &ObjectId| resolve_base(pack, base);
            if let Some(packed) = pack.read_object_with_resolver(oid, resolver)? {
                *self.last_found.write().unwrap() = Some(idx);
                return Ok(Some(packed));
            }
        }

        Ok(None)
    }

    pub(crate) fn iter_index_oids(&self) -> Result<Vec<ObjectId>, OdbError> {
        self.rescan_if_stale()?;
        let packs = self.packs.read().unwrap();
        Ok(packs
            .iter()
            .flat_map(|pack| pack.index().iter().map(|(oid, _offset)| oid))
            .collect())
    }
}

impl OdbBackend for PackBackend {
    fn read(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
        match self.read_object_resolving(oid, &|_| None)? {
            Some(packed) => {
                let obj = Object::parse_content(packed.obj_type, &packed.data).map_err(|e| {
                    OdbError::Corrupt {
                        oid: *oid,
                        reason: e.to_string(),
                    }
                })?;
                Ok(Some(obj))
            }
            None => Ok(None),
        }
    }

    fn read_header(&self, oid: &ObjectId) -> Result<Option<(ObjectType, usize)>, OdbError> {
        match self.read_object_resolving(oid, &|_| None)? {
            Some(packed) => Ok(Some((packed.obj_type, packed.data.len()))),
            None => Ok(None),
        }
    }

    fn contains(&self, oid: &ObjectId) -> bool {
        if self.rescan_if_stale().is_err() {
            return false;
        }
        self.packs.read().unwrap().iter().any(|pack| pack.contains(oid))
    }

    fn write(&self, _obj: &Object) -> Result<ObjectId, OdbError> {
        Err(OdbError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "cannot write to pack files directly",
        )))
    }

    fn lookup_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError> {
        self.rescan_if_stale()?;
        let prefix_bytes = hex_prefix_to_bytes(prefix);
        let packs = self.packs.read().unwrap();
        let mut matches = Vec::new();
        for pack in packs.iter() {
            for (oid, _offset) in pack.index().lookup_prefix(&prefix_bytes) {
                matches.push(oid);
            }
        }
        Ok(matches)
    }

    fn refresh(&self) -> Result<(), OdbError> {
        self.rescan()?;
        *self.dir_mtime.write().unwrap() = self.current_mtime();
        Ok(())
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// Convert a hex prefix string to raw bytes for pack index prefix lookup.
///
/// For even-length prefixes, this is a straightforward hex decode.
/// For odd-length prefixes, the last nibble is padded with 0.
pub(crate) fn hex_prefix_to_bytes(hex: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(hex.len().div_ceil(2));
    let chars: Vec<u8> = hex
        .bytes()
        .map(|b| match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => 0,
        })
        .collect();

    for chunk in chars.chunks(2) {
        if chunk.len() == 2 {
            bytes.push((chunk[0] << 4) | chunk[1]);
        } else {
            bytes.push(chunk[0] << 4);
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_prefix_to_bytes_even() {
        assert_eq!(hex_prefix_to_bytes("abcd"), vec![0xab, 0xcd]);
    }

    #[test]
    fn hex_prefix_to_bytes_odd() {
        assert_eq!(hex_prefix_to_bytes("abc"), vec![0xab, 0xc0]);
    }

    #[test]
    fn hex_prefix_to_bytes_empty() {
        assert_eq!(hex_prefix_to_bytes(""), Vec::<u8>::new());
    }

    #[test]
    fn hex_prefix_to_bytes_single() {
        assert_eq!(hex_prefix_to_bytes("a"), vec![0xa0]);
    }
}
