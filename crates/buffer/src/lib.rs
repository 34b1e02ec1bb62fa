//! Buffer pool manager for page-level caching and I/O.
//!
//! The pool sits between the storage layer and everything that touches
//! pages, providing:
//! - a fixed number of frames, each holding one resident page
//! - pin counts protecting in-use pages from eviction
//! - LRU victim selection with dirty write-back
//! - per-file page allocation and force-flush across multiple files
//!
//! Every `fetch_page`/`create_page` returns the page pinned; callers pair
//! each acquisition with exactly one [`BufferPool::unpin`] on every exit
//! path.
//!
//! # Example
//!
//! ```no_run
//! use buffer::BufferPool;
//!
//! let mut pool = BufferPool::new("/tmp/db", 4).unwrap();
//! let movies = pool.open_file("imdb_movies.bin").unwrap();
//!
//! let pid = {
//!     let page = pool.create_page(movies).unwrap().expect("a free frame");
//!     page.id()
//! };
//! pool.mark_dirty(movies, pid);
//! pool.unpin(movies, pid);
//! pool.force(movies).unwrap();
//! ```

#[cfg(test)]
mod tests;

use common::{DbError, DbResult, FileId, PageId, PAGE_SIZE};
use hashbrown::HashMap;
use lru::LruCache;
use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
};
use storage::Page;

/// One cache slot: a resident page plus its bookkeeping.
#[derive(Debug)]
struct FrameSlot {
    file: FileId,
    page: Page,
    dirty: bool,
    pin_count: u32,
}

/// An open file backing one table or index.
#[derive(Debug)]
struct FileState {
    name: String,
    file: File,
    /// Next page id to hand out; doubles as the file's high-water mark.
    next_page: u32,
}

/// Fixed-capacity page cache over one or more files.
#[derive(Debug)]
pub struct BufferPool {
    base_dir: PathBuf,
    frames: Vec<Option<FrameSlot>>,
    /// (file, page) → frame index for resident pages.
    page_table: HashMap<(FileId, PageId), usize>,
    /// Recency ordering over frame indices; refreshed on fetch hits and
    /// installs only, never by `mark_dirty` or `unpin`.
    recency: LruCache<usize, ()>,
    files: Vec<FileState>,
    names: HashMap<String, FileId>,
}

impl BufferPool {
    /// Create a pool with `capacity` frames over files under `base_dir`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(base_dir: impl Into<PathBuf>, capacity: usize) -> DbResult<Self> {
        assert!(capacity > 0, "buffer pool needs at least one frame");
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        let mut frames = Vec::with_capacity(capacity);
        frames.resize_with(capacity, || None);
        Ok(Self {
            base_dir,
            frames,
            page_table: HashMap::new(),
            recency: LruCache::unbounded(),
            files: Vec::new(),
            names: HashMap::new(),
        })
    }

    /// Number of frames.
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Number of pages currently resident.
    pub fn resident(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }

    /// Absolute path of a file managed by this pool.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Open (or create) a file and return its handle. Idempotent: opening
    /// the same name twice returns the same id.
    pub fn open_file(&mut self, name: &str) -> DbResult<FileId> {
        if let Some(&id) = self.names.get(name) {
            return Ok(id);
        }
        let path = self.path_of(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let next_page = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;
        let id = FileId(self.files.len() as u16);
        self.files.push(FileState {
            name: name.to_string(),
            file,
            next_page,
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Whether a file of this name already exists on disk with content.
    pub fn file_has_pages(&self, name: &str) -> bool {
        fs::metadata(self.path_of(name)).map_or(false, |m| m.len() >= PAGE_SIZE as u64)
    }

    /// Drop any cached pages of `file` without write-back and reset it to
    /// zero length, so the next `create_page` starts over at page 0.
    pub fn truncate_file(&mut self, file: FileId) -> DbResult<()> {
        self.check_file(file)?;
        for idx in 0..self.frames.len() {
            let belongs = matches!(&self.frames[idx], Some(slot) if slot.file == file);
            if belongs {
                let slot = self.frames[idx].take().unwrap();
                self.page_table.remove(&(file, slot.page.id()));
                self.recency.pop(&idx);
            }
        }
        let state = &mut self.files[file.0 as usize];
        state.file.set_len(0)?;
        state.next_page = 0;
        Ok(())
    }

    /// The file's high-water page count: flushed pages plus pages created in
    /// frames but not yet written.
    pub fn page_count(&self, file: FileId) -> u32 {
        self.files
            .get(file.0 as usize)
            .map(|s| s.next_page)
            .unwrap_or(0)
    }

    /// Fetch a page, pinned.
    ///
    /// On a cache hit the frame's recency is refreshed. Returns `Ok(None)`
    /// when `pid` is past the file's high-water mark, or when every frame is
    /// pinned so no victim can be freed.
    pub fn fetch_page(&mut self, file: FileId, pid: PageId) -> DbResult<Option<&mut Page>> {
        self.check_file(file)?;
        if let Some(&idx) = self.page_table.get(&(file, pid)) {
            self.recency.promote(&idx);
            let slot = self.frames[idx].as_mut().expect("mapped frame occupied");
            slot.pin_count += 1;
            return Ok(Some(&mut slot.page));
        }

        if pid.0 >= self.files[file.0 as usize].next_page {
            return Ok(None);
        }
        let Some(idx) = self.free_frame()? else {
            return Ok(None);
        };
        let Some(bytes) = Self::read_from_disk(&mut self.files[file.0 as usize], pid)? else {
            return Ok(None);
        };
        let page = Page::from_disk(pid, bytes)?;
        Ok(Some(self.install(idx, file, page, false)))
    }

    /// Allocate the file's next page id and install a fresh empty page,
    /// pinned and dirty. Returns `Ok(None)` when no victim can be freed.
    ///
    /// The new page belongs to the file's extent immediately, even before
    /// its first flush.
    pub fn create_page(&mut self, file: FileId) -> DbResult<Option<&mut Page>> {
        self.check_file(file)?;
        let Some(idx) = self.free_frame()? else {
            return Ok(None);
        };
        let state = &mut self.files[file.0 as usize];
        let pid = PageId(state.next_page);
        state.next_page += 1;
        let page = Page::new(pid);
        Ok(Some(self.install(idx, file, page, true)))
    }

    /// Set the dirty flag on a resident page; a no-op if not resident.
    pub fn mark_dirty(&mut self, file: FileId, pid: PageId) {
        if let Some(&idx) = self.page_table.get(&(file, pid)) {
            if let Some(slot) = self.frames[idx].as_mut() {
                slot.dirty = true;
            }
        }
    }

    /// Drop one pin on a resident page, saturating at zero. Silent when the
    /// page is not resident, to accommodate late callers.
    pub fn unpin(&mut self, file: FileId, pid: PageId) {
        if let Some(&idx) = self.page_table.get(&(file, pid)) {
            if let Some(slot) = self.frames[idx].as_mut() {
                slot.pin_count = slot.pin_count.saturating_sub(1);
            }
        }
    }

    /// Write every dirty resident page of `file` back to disk and clear its
    /// dirty flag.
    pub fn force(&mut self, file: FileId) -> DbResult<()> {
        self.check_file(file)?;
        for frame in self.frames.iter_mut() {
            if let Some(slot) = frame {
                if slot.file == file && slot.dirty {
                    Self::write_to_disk(&mut self.files[file.0 as usize], &slot.page)?;
                    slot.dirty = false;
                }
            }
        }
        self.files[file.0 as usize].file.flush()?;
        Ok(())
    }

    /// Force every open file.
    pub fn force_all(&mut self) -> DbResult<()> {
        let ids: Vec<FileId> = (0..self.files.len() as u16).map(FileId).collect();
        for id in ids {
            self.force(id)?;
        }
        Ok(())
    }

    /// Safety valve: zero every pin count. A correct pipeline never needs
    /// this; it exists so an operator that leaked pins under fault cannot
    /// wedge the pool permanently.
    pub fn release_all_pins(&mut self) {
        for slot in self.frames.iter_mut().flatten() {
            if slot.pin_count > 0 {
                log::warn!(
                    "releasing {} leaked pin(s) on page {} of {}",
                    slot.pin_count,
                    slot.page.id().0,
                    self.files[slot.file.0 as usize].name
                );
                slot.pin_count = 0;
            }
        }
    }

    /// Aggressive cleanup: release pins, flush everything, drop all frames.
    pub fn purge(&mut self) -> DbResult<()> {
        self.release_all_pins();
        self.force_all()?;
        self.frames.iter_mut().for_each(|f| *f = None);
        self.page_table.clear();
        self.recency.clear();
        Ok(())
    }

    fn check_file(&self, file: FileId) -> DbResult<()> {
        if (file.0 as usize) < self.files.len() {
            Ok(())
        } else {
            Err(DbError::Buffer(format!("unknown file handle {}", file.0)))
        }
    }

    /// Pick a frame for a new page: an empty frame if one exists, otherwise
    /// the least-recently-used unpinned frame, evicted (with write-back if
    /// dirty). `Ok(None)` when everything is pinned.
    fn free_frame(&mut self) -> DbResult<Option<usize>> {
        if let Some(idx) = self.frames.iter().position(|f| f.is_none()) {
            return Ok(Some(idx));
        }
        let victim = self
            .recency
            .iter()
            .rev()
            .map(|(idx, _)| *idx)
            .find(|&idx| matches!(&self.frames[idx], Some(slot) if slot.pin_count == 0));
        let Some(idx) = victim else {
            log::warn!("buffer pool exhausted: all {} frames pinned", self.frames.len());
            return Ok(None);
        };
        self.evict(idx)?;
        Ok(Some(idx))
    }

    fn evict(&mut self, idx: usize) -> DbResult<()> {
        if let Some(slot) = &self.frames[idx] {
            if slot.dirty {
                Self::write_to_disk(&mut self.files[slot.file.0 as usize], &slot.page)?;
            }
        }
        if let Some(slot) = self.frames[idx].take() {
            log::debug!(
                "evicting page {} of {}",
                slot.page.id().0,
                self.files[slot.file.0 as usize].name
            );
            self.page_table.remove(&(slot.file, slot.page.id()));
            self.recency.pop(&idx);
        }
        Ok(())
    }

    fn install(&mut self, idx: usize, file: FileId, page: Page, dirty: bool) -> &mut Page {
        let pid = page.id();
        self.frames[idx] = Some(FrameSlot {
            file,
            page,
            dirty,
            pin_count: 1,
        });
        self.page_table.insert((file, pid), idx);
        self.recency.push(idx, ());
        &mut self.frames[idx].as_mut().unwrap().page
    }

    fn read_from_disk(state: &mut FileState, pid: PageId) -> DbResult<Option<Vec<u8>>> {
        let len = state.file.metadata()?.len();
        if pid.offset() + PAGE_SIZE as u64 > len {
            // Allocated but never flushed; treat like a read past EOF.
            return Ok(None);
        }
        state.file.seek(SeekFrom::Start(pid.offset()))?;
        let mut buf = vec![0u8; PAGE_SIZE];
        state.file.read_exact(&mut buf)?;
        Ok(Some(buf))
    }

    fn write_to_disk(state: &mut FileState, page: &Page) -> DbResult<()> {
        state.file.seek(SeekFrom::Start(page.id().offset()))?;
        state.file.write_all(page.bytes())?;
        Ok(())
    }
}

/// Single-file shape over the shared pool: the same contract with the file
/// argument fixed at construction. Composes with the multi-file shape by
/// borrowing the same frames.
#[derive(Debug)]
pub struct FileView<'p> {
    pool: &'p mut BufferPool,
    file: FileId,
}

impl<'p> FileView<'p> {
    pub fn new(pool: &'p mut BufferPool, file: FileId) -> Self {
        Self { pool, file }
    }

    pub fn file_id(&self) -> FileId {
        self.file
    }

    pub fn page_count(&self) -> u32 {
        self.pool.page_count(self.file)
    }

    pub fn fetch(&mut self, pid: PageId) -> DbResult<Option<&mut Page>> {
        self.pool.fetch_page(self.file, pid)
    }

    pub fn create(&mut self) -> DbResult<Option<&mut Page>> {
        self.pool.create_page(self.file)
    }

    pub fn mark_dirty(&mut self, pid: PageId) {
        self.pool.mark_dirty(self.file, pid);
    }

    pub fn unpin(&mut self, pid: PageId) {
        self.pool.unpin(self.file, pid);
    }

    pub fn force(&mut self) -> DbResult<()> {
        self.pool.force(self.file)
    }
}
