//! Index Module
//!
//! Ordered key-value collaborators the cluster layer reads through.
//!
//! ## Responsibilities
//! - Keep entries in lexicographic key order
//! - Cursors with seek-to-key-or-greater, advance, read, delete-current
//!
//! Isolation is whatever the implementation provides; both shipped indexes
//! apply every operation immediately.

mod cursor;
mod log_index;
mod memory;

use bytes::Bytes;

use crate::error::Result;

pub use log_index::{LogIndex, INDEX_DELETE_TYPE, INDEX_PUT_TYPE};
pub use memory::MemoryIndex;

/// A position in an ordered index
pub trait Cursor {
    /// Move to the smallest key `>= key`. Returns whether such an entry exists.
    fn seek_key_or_greater(&mut self, key: &[u8]) -> Result<bool>;

    /// Advance to the next entry. Returns `false` (and clears the
    /// position) once the index is exhausted.
    fn next(&mut self) -> Result<bool>;

    /// Key at the current position
    fn key(&self) -> Option<&[u8]>;

    /// Value at the current position
    fn value(&self) -> Option<&Bytes>;

    /// Delete the entry at the current position without moving.
    /// Returns whether an entry was deleted.
    fn delete_current(&mut self) -> Result<bool>;

    /// Release the cursor. Idempotent.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// An ordered key-value table
pub trait OrderedIndex: Send + Sync {
    fn open_cursor(&self) -> Result<Box<dyn Cursor + '_>>;

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`. Returns whether it was present.
    fn delete(&self, key: &[u8]) -> Result<bool>;

    /// Number of live entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
