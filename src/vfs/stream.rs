//! Sequential input over a virtual file

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, StoreError};

use super::iterator::ClusterIterator;

/// Reads a file's bytes cluster by cluster from a starting position.
///
/// The stream remembers the file system's epoch at open; any later mutation
/// makes it [obsolete](Self::is_obsolete).
pub struct VfsInputStream<'a> {
    iterator: ClusterIterator<'a>,
    position: u64,
    epoch: &'a AtomicU64,
    opened_at: u64,
}

impl<'a> VfsInputStream<'a> {
    pub(crate) fn new(
        iterator: ClusterIterator<'a>,
        position: u64,
        epoch: &'a AtomicU64,
        opened_at: u64,
    ) -> Self {
        Self {
            iterator,
            position,
            epoch,
            opened_at,
        }
    }

    /// Logical file position of the next byte
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether the file system changed since this stream was opened
    pub fn is_obsolete(&self) -> bool {
        self.epoch.load(Ordering::Acquire) != self.opened_at
    }

    /// Read into `buf`. Returns the number of bytes read; zero at end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut read = 0;
        while read < buf.len() {
            let Some(offset) = self.offset_in_current()? else {
                break;
            };
            let cluster = self.iterator.current()?;
            let n = (buf.len() - read).min(cluster.len() - offset);
            buf[read..read + n].copy_from_slice(&cluster.data()[offset..offset + n]);
            read += n;
            self.position += n as u64;
        }
        Ok(read)
    }

    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Skip up to `count` bytes. Returns the number skipped, short only at
    /// end of file.
    pub fn skip(&mut self, count: u64) -> Result<u64> {
        let mut skipped = 0u64;
        while skipped < count {
            let Some(offset) = self.offset_in_current()? else {
                break;
            };
            let available = (self.iterator.current()?.len() - offset) as u64;
            let step = available.min(count - skipped);
            skipped += step;
            self.position += step;
        }
        Ok(skipped)
    }

    pub fn close(&mut self) {
        self.iterator.close();
    }

    /// Offset of `position` within the current cluster, moving past
    /// clusters that are already consumed. `None` at end of file.
    fn offset_in_current(&mut self) -> Result<Option<usize>> {
        loop {
            if !self.iterator.has_cluster() {
                return Ok(None);
            }
            let cluster = self.iterator.current()?;
            if self.position < cluster.starting_position() {
                return Err(StoreError::corrupted(format!(
                    "cluster {} starts at {} but the stream is at {}",
                    cluster.number(),
                    cluster.starting_position(),
                    self.position
                )));
            }
            let offset = self.position - cluster.starting_position();
            if offset < cluster.len() as u64 {
                return Ok(Some(offset as usize));
            }
            self.iterator.move_to_next()?;
        }
    }
}
