//! Pack checksum and integrity verification.

use git_hash::hasher::Hasher;
use git_hash::ObjectId;

use crate::pack::PackFile;
use crate::PackError;

impl PackFile {
    /// Verify the pack file checksum.
    ///
    /// Computes SHA-1 over all pack content (excluding the trailing checksum)
    /// by scanning the file through sequential windows, and compares it with
    /// the stored checksum.
    pub fn verify_checksum(&self) -> Result<(), PackError> {
        let hash_len = self.hash_algo().digest_len();
        let (windows, file_id) = self.window_manager();
        let file_len = windows.file_len(file_id);

        if file_len < hash_len as u64 {
            return Err(PackError::InvalidHeader("pack too small for checksum".into()));
        }
        let content_len = file_len - hash_len as u64;

        let mut hasher = Hasher::new(self.hash_algo());
        let mut pos = 0u64;
        while pos < content_len {
            let chunk = (content_len - pos).min(crate::window::DEFAULT_WINDOW_SIZE) as usize;
            let (window, local) = windows.open_window(file_id, pos, chunk)?;
            hasher.update(&window.bytes()[local..local + chunk]);
            pos += chunk as u64;
        }
        let computed = hasher.finalize().map_err(PackError::Hash)?;

        let (window, local) = windows.open_window(file_id, content_len, hash_len)?;
        let stored = ObjectId::from_bytes(&window.bytes()[local..local + hash_len], self.hash_algo())
            .map_err(|_| PackError::InvalidHeader("invalid checksum bytes".into()))?;

        if computed != stored {
            return Err(PackError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        Ok(())
    }
}

/// Iterator over all objects in a pack file.
pub struct PackIter<'a> {
    pack: &'a PackFile,
    index_pos: u32,
}

impl PackFile {
    /// Iterate over all objects in the pack.
    ///
    /// Objects are yielded in index-sorted order (by OID).
    pub fn iter(&self) -> PackIter<'_> {
        PackIter {
            pack: self,
            index_pos: 0,
        }
    }
}

impl<'a> Iterator for PackIter<'a> {
    type Item = Result<(ObjectId, crate::PackedObject), PackError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index_pos >= self.pack.num_objects() {
            return None;
        }

        let oid = self.pack.index().oid_at_index(self.index_pos);
        let offset = self.pack.index().offset_at_index(self.index_pos);
        self.index_pos += 1;

        Some(self.pack.read_at_offset(offset).map(|obj| (oid, obj)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.pack.num_objects() - self.index_pos) as usize;
        (remaining, Some(remaining))
    }
}
