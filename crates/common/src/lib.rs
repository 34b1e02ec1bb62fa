#[cfg(test)]
mod tests;

use std::{io, path::PathBuf};
use thiserror::Error;

/// Size of every on-disk page, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Bytes at the front of every record page: 4-byte page id followed by a
/// 4-byte row count, both big-endian.
pub const PAGE_HEADER_SIZE: usize = 8;

/// Logical identifier for a 4 KiB page within one file.
/// Examples:
/// - `let first = PageId(0);`
/// - `let movies_page = PageId(42);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Byte offset of this page within its file.
    pub fn offset(self) -> u64 {
        self.0 as u64 * PAGE_SIZE as u64
    }
}

/// Identifier for a file registered with the buffer pool.
///
/// Handed out by the pool when a file is opened; cheap to copy and hash, so
/// operators hold one of these instead of a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileId(pub u16);

/// Fully-qualified identifier for a row within a file.
///
/// Stable for the life of the database: rows are append-only, so the
/// (page, slot) of a row never changes once assigned.
/// Examples:
/// - `let rid = RecordId { page: PageId(3), slot: 17 };`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page: PageId, slot: u16) -> Self {
        Self { page, slot }
    }
}

/// Inclusive key-range check shared by the range predicate and the index
/// range search, so the filtered-scan and index-scan plans agree.
///
/// The lower bound is plain lexical. The upper bound compares only the key's
/// prefix of the bound's length: `hi = "A"` admits every key starting with
/// "A", the way a title range query is expected to behave.
pub fn range_contains(lo: &str, hi: &str, key: &str) -> bool {
    key >= lo && upper_bound_admits(hi, key)
}

/// Upper-bound half of [`range_contains`]: does `hi` admit `key`?
pub fn upper_bound_admits(hi: &str, key: &str) -> bool {
    let n = hi.len().min(key.len());
    &key.as_bytes()[..n] <= &hi.as_bytes()[..]
}

/// Canonical error type shared across the engine's subsystems.
///
/// End-of-stream and page-full are deliberately *not* errors; they are `None`
/// returns at the call sites that can produce them.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("buffer: {0}")]
    Buffer(String),
    #[error("index: {0}")]
    Index(String),
    #[error("exec: {0}")]
    Executor(String),
    #[error("corrupt page: {0}")]
    Corrupt(String),
    #[error("file missing: {0}")]
    FileMissing(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the engine.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./imdb_data"))
///     .buffer_pool_frames(64)
///     .build();
/// assert_eq!(config.buffer_pool_frames, 64);
/// ```
#[derive(Clone, Debug, bon::Builder)]
pub struct Config {
    /// Directory where table and index files live.
    #[builder(default = PathBuf::from("."))]
    pub data_dir: PathBuf,
    /// Number of frames the buffer pool keeps resident.
    #[builder(default = 16)]
    pub buffer_pool_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            buffer_pool_frames: 16,
        }
    }
}
