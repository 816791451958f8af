//! Segment I/O Module
//!
//! Byte-range collaborators the log is built on. The log never touches files
//! directly; it only asks a [`DataReader`] for pages of a segment and hands a
//! [`DataWriter`] bytes to append to the tail segment.
//!
//! ## Segment Layout
//! ```text
//! address space:  0          file_size     2*file_size
//!                 ├─────────────┼─────────────┼──────────
//!                 │ segment 0   │ segment 1   │ tail ...
//!                 └─────────────┴─────────────┴──────────
//! ```
//! A segment is identified by its start address (a multiple of `file_size`).

mod file;
mod memory;

use std::path::PathBuf;

use crate::error::Result;

pub use file::{parse_segment_name, segment_name, FileDataReader, FileDataWriter, SEGMENT_EXTENSION};
pub use memory::{MemoryDataReader, MemoryDataWriter, MemoryStorage};

/// Metadata about one segment as seen by a reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    /// Start address of the segment
    pub start: u64,
    /// Number of bytes currently stored in the segment
    pub length: u64,
    /// Backing file, when the segment lives on disk
    pub path: Option<PathBuf>,
}

/// Reads byte ranges of segments
pub trait DataReader: Send + Sync {
    /// All existing segments, ordered by start address
    fn segments(&self) -> Result<Vec<SegmentInfo>>;

    /// Read exactly `len` bytes at `offset` within the segment starting at
    /// `segment_start`, or fail.
    fn read_page(&self, segment_start: u64, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Release any open handles. Later reads may reopen them.
    fn close(&self);
}

/// Appends bytes to the tail segment
pub trait DataWriter: Send {
    /// Make the segment starting at `start` the append target, creating it
    /// if needed. Appends go to its end.
    fn open_segment(&mut self, start: u64) -> Result<()>;

    /// Append to the current segment, returning the number of bytes written
    fn append(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Push buffered bytes to the underlying storage
    fn flush(&mut self) -> Result<()>;

    /// Flush and make durable
    fn sync(&mut self) -> Result<()>;

    /// Cut the segment starting at `start` down to `len` bytes
    fn truncate_segment(&mut self, start: u64, len: u64) -> Result<()>;

    /// Delete the segment starting at `start`
    fn remove_segment(&mut self, start: u64) -> Result<()>;

    /// Flush, sync and drop the current segment handle
    fn close(&mut self) -> Result<()>;
}
