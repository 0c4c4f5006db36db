//! PackFile: reading .pack files.
//!
//! A pack file contains a header, a sequence of compressed objects
//! (possibly deltified), and a trailing checksum.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::bufread::ZlibDecoder;
use git_hash::{HashAlgorithm, ObjectId};
use git_object::ObjectType;
use std::io::Read;

use crate::entry::{parse_entry_header, PackEntry};
use crate::index::PackIndex;
use crate::window::{FileId, WindowManager};
use crate::{
    PackEntryType, PackError, PackedObject, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION,
    MAX_DELTA_CHAIN_DEPTH,
};

/// Largest a pack entry header (type+size varint, plus an OFS_DELTA offset
/// or REF_DELTA oid) can be. Generous enough that a single window probe
/// always covers it without needing a retry.
const MAX_HEADER_PROBE: usize = 32;

/// A packfile read through bounded sliding-window mappings, with its index.
pub struct PackFile {
    windows: Arc<WindowManager>,
    file_id: FileId,
    index: PackIndex,
    pack_path: PathBuf,
    num_objects: u32,
    hash_algo: HashAlgorithm,
    max_delta_depth: usize,
}

impl PackFile {
    /// Open a pack file and its associated index, using a private window
    /// manager scoped to just this pack. Most callers managing more than
    /// one pack at once should use [`open_shared`](Self::open_shared) so
    /// the window budget is enforced across every open pack together.
    pub fn open(pack_path: impl AsRef<Path>) -> Result<Self, PackError> {
        Self::open_shared(pack_path, Arc::new(WindowManager::new()), MAX_DELTA_CHAIN_DEPTH)
    }

    /// Open a pack file, bailing out of delta chains deeper than `max_delta_depth`.
    pub fn open_with_depth(
        pack_path: impl AsRef<Path>,
        max_delta_depth: usize,
    ) -> Result<Self, PackError> {
        Self::open_shared(pack_path, Arc::new(WindowManager::new()), max_delta_depth)
    }

    /// Open a pack file against a window manager shared with other packs
    /// (typically one per object database), so its global byte budget is
    /// enforced across all of them rather than per file.
    pub fn open_shared(
        pack_path: impl AsRef<Path>,
        windows: Arc<WindowManager>,
        max_delta_depth: usize,
    ) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref().to_path_buf();

        // Derive .idx path from .pack path
        let idx_path = pack_path.with_extension("idx");

        let file_id = windows.register_file(&pack_path)?;
        if windows.file_len(file_id) < PACK_HEADER_SIZE as u64 {
            return Err(PackError::InvalidHeader("file too small".into()));
        }

        let (header_window, local) = windows.open_window(file_id, 0, PACK_HEADER_SIZE)?;
        let header = &header_window.bytes()[local..local + PACK_HEADER_SIZE];
        if &header[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let num_objects = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        drop(header_window);

        let index = PackIndex::open(&idx_path)?;

        // Validate object count matches between pack and index
        if index.num_objects() != num_objects {
            return Err(PackError::InvalidHeader(format!(
                "pack has {} objects but index has {}",
                num_objects,
                index.num_objects()
            )));
        }

        Ok(Self {
            windows,
            file_id,
            index,
            pack_path,
            num_objects,
            hash_algo: HashAlgorithm::Sha1,
            max_delta_depth,
        })
    }

    /// Access to the underlying window manager and this pack's file handle,
    /// for crate-internal readers (checksum verification, pack iteration)
    /// that need sequential access.
    pub(crate) fn window_manager(&self) -> (&WindowManager, FileId) {
        (&self.windows, self.file_id)
    }

    /// Read an object by OID.
    ///
    /// Returns `None` if the OID is not in this pack.
    pub fn read_object(&self, oid: &ObjectId) -> Result<Option<PackedObject>, PackError> {
        match self.index.lookup(oid) {
            Some(offset) => self.read_at_offset(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Read an object at a known offset in the pack.
    ///
    /// Resolves delta chains iteratively (not recursively) to handle
    /// arbitrary chain depths safely.
    pub fn read_at_offset(&self, offset: u64) -> Result<PackedObject, PackError> {
        self.read_at_offset_with_resolver(offset, |_| None)
    }

    /// Read an object by OID, with an external resolver for cross-pack REF_DELTA bases.
    ///
    /// The resolver is called when a REF_DELTA references a base OID not found in this pack.
    /// It should return the resolved base object's type and data if found externally.
    pub fn read_object_with_resolver(
        &self,
        oid: &ObjectId,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<Option<PackedObject>, PackError> {
        match self.index.lookup(oid) {
            Some(offset) => self.read_at_offset_with_resolver(offset, resolver).map(Some),
            None => Ok(None),
        }
    }

    /// Read an object at a known offset, with an external resolver for cross-pack REF_DELTA bases.
    fn read_at_offset_with_resolver(
        &self,
        offset: u64,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<PackedObject, PackError> {
        // Build the delta chain (innermost delta first, base last)
        let mut chain: Vec<(PackEntry, Vec<u8>)> = Vec::new();
        let mut current_offset = offset;

        for depth in 0..self.max_delta_depth {
            let entry = self.parse_header_at(current_offset)?;
            let decompressed = self.read_compressed(&entry)?;

            match entry.entry_type {
                PackEntryType::Commit
                | PackEntryType::Tree
                | PackEntryType::Blob
                | PackEntryType::Tag => {
                    // Base object — resolve chain
                    let obj_type = entry
                        .entry_type
                        .to_object_type()
                        .expect("non-delta type");

                    // Apply delta chain in reverse order
                    let mut data = decompressed;
                    for (_, delta_data) in chain.iter().rev() {
                        data = crate::delta::apply::apply_delta(&data, delta_data)?;
                    }

                    return Ok(PackedObject {
                        obj_type,
                        data,
                    });
                }
                PackEntryType::OfsDelta { base_offset } => {
                    chain.push((entry, decompressed));
                    current_offset = base_offset;
                }
                PackEntryType::RefDelta { base_oid } => {
                    chain.push((entry, decompressed));
                    // Try the index within this pack first
                    if let Some(base_offset) = self.index.lookup(&base_oid) {
                        current_offset = base_offset;
                    } else if let Some((obj_type, base_data)) = resolver(&base_oid) {
                        // External resolver found the base — apply delta chain
                        let mut data = base_data;
                        for (_, delta_data) in chain.iter().rev() {
                            data = crate::delta::apply::apply_delta(&data, delta_data)?;
                        }
                        return Ok(PackedObject { obj_type, data });
                    } else {
                        return Err(PackError::MissingBase(base_oid));
                    }
                }
            }

            if depth + 1 >= self.max_delta_depth {
                return Err(PackError::DeltaChainTooDeep {
                    offset,
                    max_depth: self.max_delta_depth,
                });
            }
        }

        Err(PackError::DeltaChainTooDeep {
            offset,
            max_depth: self.max_delta_depth,
        })
    }

    /// Parse the entry header at `offset`, probing a small window first
    /// (every real pack header fits in [`MAX_HEADER_PROBE`] bytes).
    fn parse_header_at(&self, offset: u64) -> Result<PackEntry, PackError> {
        let file_len = self.windows.file_len(self.file_id);
        let remaining = file_len.saturating_sub(offset);
        let probe_len = (MAX_HEADER_PROBE as u64).min(remaining.max(1)) as usize;
        let (window, local) = self.windows.open_window(self.file_id, offset, probe_len)?;
        parse_entry_header(&window.bytes()[local..], offset)
    }

    /// Decompress the entry's payload. Tries a single target-sized window
    /// first; if the compressed stream doesn't fit (large object, or near
    /// end of a window), retries once with a window spanning the rest of
    /// the file from the entry's data offset.
    fn read_compressed(&self, entry: &PackEntry) -> Result<Vec<u8>, PackError> {
        let (window, local) = self.windows.open_window(self.file_id, entry.data_offset, 1)?;
        let available = &window.bytes()[local..];
        if let Ok(buf) = decompress(available, entry.uncompressed_size, entry.data_offset) {
            if buf.len() == entry.uncompressed_size {
                return Ok(buf);
            }
        }

        let file_len = self.windows.file_len(self.file_id);
        let remaining = (file_len.saturating_sub(entry.data_offset)) as usize;
        let (window, local) =
            self.windows.open_window(self.file_id, entry.data_offset, remaining)?;
        let available = &window.bytes()[local..];
        decompress(available, entry.uncompressed_size, entry.data_offset)
    }

    /// Check if this pack contains the given OID.
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.index.lookup(oid).is_some()
    }

    /// Get the number of objects in this pack.
    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    /// Get the pack index.
    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// Get the path to the .pack file.
    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    /// Total length of the pack file in bytes.
    pub fn len(&self) -> u64 {
        self.windows.file_len(self.file_id)
    }

    /// Get the hash algorithm used by this pack.
    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }
}

/// Decompress zlib data with an expected uncompressed size.
fn decompress(compressed: &[u8], expected_size: usize, offset: u64) -> Result<Vec<u8>, PackError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut buf = Vec::with_capacity(expected_size);
    decoder.read_to_end(&mut buf).map_err(|_| {
        PackError::CorruptEntry(offset)
    })?;
    Ok(buf)
}
