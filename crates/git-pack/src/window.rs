//! Sliding-window mmap manager for packfiles.
//!
//! A pack can be gigabytes large; mapping every open pack in full would
//! exhaust address space once a repository accumulates more than a handful
//! of them. Instead each pack is read through bounded windows: a window
//! covers `[start, start + len)` of some registered file, `start` aligned
//! to the manager's window size, and is kept mapped only while something
//! still references it or until the manager needs the space back.
//!
//! A single `WindowManager` is meant to be shared (via `Arc`) by every pack
//! a repository has open, so the global byte budget below is enforced
//! across all of them, not per file — this is the explicit, initialized
//! subsystem a repository handle holds shared ownership of, rather than
//! each pack silently mapping as much of itself as it likes.
//!
//! Windows are handed out as `Window`, a cheap `Arc` clone. "Pinning" a
//! window is just holding that clone: the manager only reclaims a window
//! once its `Arc` strong count drops to one (the manager's own copy), the
//! same refcount idiom used by the object cache.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use memmap2::MmapOptions;

/// Target size of a single window. A window grows past this only when a
/// single entry's compressed data does not fit.
pub const DEFAULT_WINDOW_SIZE: u64 = 32 * 1024 * 1024;

/// Total bytes the manager tries to keep mapped across all open windows,
/// across every registered file.
pub const DEFAULT_GLOBAL_BUDGET: u64 = 256 * 1024 * 1024;

/// Identifies a file registered with a [`WindowManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId(usize);

struct MappedWindow {
    file_id: FileId,
    offset: u64,
    mmap: memmap2::Mmap,
    last_used: AtomicU64,
}

impl MappedWindow {
    fn covers(&self, file_id: FileId, offset: u64, len: usize) -> bool {
        self.file_id == file_id
            && offset >= self.offset
            && offset + len as u64 <= self.offset + self.mmap.len() as u64
    }
}

/// A handle onto a mapped region of a registered file. Cheap to clone; the
/// underlying mapping stays alive as long as at least one clone does.
#[derive(Clone)]
pub struct Window(Arc<MappedWindow>);

impl Window {
    /// Offset in the file where this window's mapped bytes begin.
    pub fn start(&self) -> u64 {
        self.0.offset
    }

    /// The window's full mapped byte range.
    pub fn bytes(&self) -> &[u8] {
        &self.0.mmap
    }

    /// Byte slice `[offset, offset + len)`, relative to the file. Panics if
    /// the range isn't within this window — callers get a window guaranteed
    /// to cover the range they asked [`WindowManager::open_window`] for.
    pub fn slice(&self, offset: u64, len: usize) -> &[u8] {
        let start = (offset - self.0.offset) as usize;
        &self.0.mmap[start..start + len]
    }
}

struct Inner {
    clock: u64,
    files: Vec<Arc<File>>,
    file_lens: Vec<u64>,
    windows: Vec<Arc<MappedWindow>>,
}

/// Opens bounded windows onto any number of registered files, evicting the
/// least recently used unpinned window (from any file) when the shared
/// global budget would otherwise be exceeded.
pub struct WindowManager {
    window_size: u64,
    global_budget: u64,
    inner: Mutex<Inner>,
}

impl WindowManager {
    /// A manager with the default window size and global budget.
    pub fn new() -> Self {
        Self::with_tunables(DEFAULT_WINDOW_SIZE, DEFAULT_GLOBAL_BUDGET)
    }

    pub fn with_tunables(window_size: u64, global_budget: u64) -> Self {
        Self {
            window_size: window_size.max(1),
            global_budget,
            inner: Mutex::new(Inner {
                clock: 0,
                files: Vec::new(),
                file_lens: Vec::new(),
                windows: Vec::new(),
            }),
        }
    }

    /// Register a file for windowed access, returning a handle to use with
    /// [`open_window`](Self::open_window).
    pub fn register_file(&self, path: impl AsRef<Path>) -> io::Result<FileId> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut inner = self.inner.lock().unwrap();
        inner.files.push(Arc::new(file));
        inner.file_lens.push(len);
        Ok(FileId(inner.files.len() - 1))
    }

    pub fn file_len(&self, file_id: FileId) -> u64 {
        self.inner.lock().unwrap().file_lens[file_id.0]
    }

    /// Return a window covering at least `[offset, offset + min_len)` of
    /// `file_id`, along with the local byte index of `offset` within that
    /// window.
    ///
    /// Reuses an already-open window when one covers the range; otherwise
    /// maps a new window aligned to the window size (grown to `min_len` if
    /// that's larger), evicting unpinned windows by least-recently-used
    /// order — across all registered files — until the new mapping fits the
    /// global budget or nothing more can be reclaimed.
    pub fn open_window(
        &self,
        file_id: FileId,
        offset: u64,
        min_len: usize,
    ) -> io::Result<(Window, usize)> {
        let mut inner = self.inner.lock().unwrap();
        inner.clock += 1;
        let clock = inner.clock;

        if let Some(w) = inner
            .windows
            .iter()
            .find(|w| w.covers(file_id, offset, min_len))
        {
            w.last_used.store(clock, Ordering::Relaxed);
            let local = (offset - w.offset) as usize;
            return Ok((Window(w.clone()), local));
        }

        let file_len = inner.file_lens[file_id.0];
        let win_start = (offset / self.window_size) * self.window_size;
        let win_len = self.window_size.max(min_len as u64);
        let win_end = (win_start + win_len).min(file_len);
        let mapped_len = (win_end - win_start) as usize;

        self.evict_to_fit(&mut inner, mapped_len as u64);

        let file = inner.files[file_id.0].clone();
        let mmap = unsafe {
            MmapOptions::new()
                .offset(win_start)
                .len(mapped_len)
                .map(&*file)?
        };
        let window = Arc::new(MappedWindow {
            file_id,
            offset: win_start,
            mmap,
            last_used: AtomicU64::new(clock),
        });
        inner.windows.push(window.clone());
        let local = (offset - win_start) as usize;
        Ok((Window(window), local))
    }

    fn evict_to_fit(&self, inner: &mut Inner, incoming: u64) {
        while total_bytes(&inner.windows) + incoming > self.global_budget {
            let victim = inner
                .windows
                .iter()
                .enumerate()
                .filter(|(_, w)| Arc::strong_count(w) == 1)
                .min_by_key(|(_, w)| w.last_used.load(Ordering::Relaxed));
            match victim {
                Some((idx, _)) => {
                    inner.windows.remove(idx);
                }
                // Every open window is pinned; map past the budget rather
                // than fail the read.
                None => break,
            }
        }
    }

    /// Number of windows currently mapped (open or pinned), across all files.
    pub fn open_window_count(&self) -> usize {
        self.inner.lock().unwrap().windows.len()
    }

    /// Total bytes currently mapped across all open windows, all files.
    pub fn mapped_bytes(&self) -> u64 {
        total_bytes(&self.inner.lock().unwrap().windows)
    }
}

impl Default for WindowManager {
    fn default() -> Self {
        Self::new()
    }
}

fn total_bytes(windows: &[Arc<MappedWindow>]) -> u64 {
    windows.iter().map(|w| w.mmap.len() as u64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(len: usize) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let mut f = File::create(&path).unwrap();
        let bytes: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
        f.write_all(&bytes).unwrap();
        (dir, path)
    }

    #[test]
    fn reads_requested_range() {
        let (_dir, path) = fixture(1024);
        let mgr = WindowManager::with_tunables(256, 4096);
        let id = mgr.register_file(&path).unwrap();
        let (window, local) = mgr.open_window(id, 300, 10).unwrap();
        assert_eq!(window.slice(300, 10), &window.bytes()[local..local + 10]);
        assert_eq!(window.slice(300, 10)[0], (300 % 256) as u8);
    }

    #[test]
    fn reuses_window_covering_same_range() {
        let (_dir, path) = fixture(1024);
        let mgr = WindowManager::with_tunables(256, 4096);
        let id = mgr.register_file(&path).unwrap();
        let (w1, _) = mgr.open_window(id, 10, 10).unwrap();
        let (w2, _) = mgr.open_window(id, 20, 10).unwrap();
        assert_eq!(w1.start(), w2.start());
        assert_eq!(mgr.open_window_count(), 1);
    }

    #[test]
    fn grows_window_past_target_size_for_large_reads() {
        let (_dir, path) = fixture(4096);
        let mgr = WindowManager::with_tunables(256, 1 << 20);
        let id = mgr.register_file(&path).unwrap();
        let (window, local) = mgr.open_window(id, 0, 1000).unwrap();
        assert!(window.bytes().len() >= 1000);
        assert_eq!(local, 0);
    }

    #[test]
    fn evicts_unpinned_window_under_budget_pressure() {
        let (_dir, path) = fixture(1024);
        // Budget fits only one 256-byte window at a time.
        let mgr = WindowManager::with_tunables(256, 256);
        let id = mgr.register_file(&path).unwrap();
        let (_w1, _) = mgr.open_window(id, 0, 10).unwrap();
        assert_eq!(mgr.open_window_count(), 1);
        let (_w2, _) = mgr.open_window(id, 512, 10).unwrap();
        // The first window was unpinned (not held), so it should have been
        // evicted to make room for the second.
        assert_eq!(mgr.open_window_count(), 1);
    }

    #[test]
    fn pinned_window_survives_eviction_pressure() {
        let (_dir, path) = fixture(1024);
        let mgr = WindowManager::with_tunables(256, 256);
        let id = mgr.register_file(&path).unwrap();
        let (held, _) = mgr.open_window(id, 0, 10).unwrap();
        let (_w2, _) = mgr.open_window(id, 512, 10).unwrap();
        // Both windows exceed the budget together, but the first is still
        // held, so the manager must map past budget rather than evict it.
        assert_eq!(mgr.open_window_count(), 2);
        assert!(held.slice(0, 4).len() == 4);
    }

    #[test]
    fn budget_is_shared_across_files() {
        let (_dir1, path1) = fixture(1024);
        let (_dir2, path2) = fixture(1024);
        let mgr = WindowManager::with_tunables(256, 256);
        let f1 = mgr.register_file(&path1).unwrap();
        let f2 = mgr.register_file(&path2).unwrap();
        let (_w1, _) = mgr.open_window(f1, 0, 10).unwrap();
        assert_eq!(mgr.open_window_count(), 1);
        // Opening a window on a different file still competes for the same budget.
        let (_w2, _) = mgr.open_window(f2, 0, 10).unwrap();
        assert_eq!(mgr.open_window_count(), 1);
    }
}
