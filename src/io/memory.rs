//! In-memory segment storage
//!
//! A shared segment map with a reader and writer on top; handy for tests and
//! for logs that do not need to outlive the process.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, StoreError};

use super::{DataReader, DataWriter, SegmentInfo};

/// Segment bytes keyed by segment start address
#[derive(Clone, Default)]
pub struct MemoryStorage {
    segments: Arc<RwLock<BTreeMap<u64, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reader(&self) -> MemoryDataReader {
        MemoryDataReader {
            storage: self.clone(),
        }
    }

    pub fn writer(&self) -> MemoryDataWriter {
        MemoryDataWriter {
            storage: self.clone(),
            current: None,
        }
    }

    /// Overwrite bytes in place, bypassing the writer (simulates disk damage)
    pub fn patch(&self, segment_start: u64, offset: usize, bytes: &[u8]) -> Result<()> {
        let mut segments = self.segments.write();
        let segment = segments
            .get_mut(&segment_start)
            .ok_or_else(|| missing_segment(segment_start))?;
        let end = offset + bytes.len();
        if end > segment.len() {
            return Err(StoreError::InvalidArgument(format!(
                "patch [{offset}, {end}) outside segment of {} bytes",
                segment.len()
            )));
        }
        segment[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Length of a segment, if it exists
    pub fn segment_len(&self, segment_start: u64) -> Option<usize> {
        self.segments.read().get(&segment_start).map(Vec::len)
    }
}

fn missing_segment(start: u64) -> StoreError {
    StoreError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("segment {start:016x} not found"),
    ))
}

/// Reader over a [`MemoryStorage`]
pub struct MemoryDataReader {
    storage: MemoryStorage,
}

impl DataReader for MemoryDataReader {
    fn segments(&self) -> Result<Vec<SegmentInfo>> {
        Ok(self
            .storage
            .segments
            .read()
            .iter()
            .map(|(&start, bytes)| SegmentInfo {
                start,
                length: bytes.len() as u64,
                path: None,
            })
            .collect())
    }

    fn read_page(&self, segment_start: u64, offset: u64, len: usize) -> Result<Vec<u8>> {
        let segments = self.storage.segments.read();
        let segment = segments
            .get(&segment_start)
            .ok_or_else(|| missing_segment(segment_start))?;
        let start = offset as usize;
        let end = start + len;
        if end > segment.len() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read [{start}, {end}) past end of segment {segment_start:016x} ({} bytes)",
                    segment.len()
                ),
            )));
        }
        Ok(segment[start..end].to_vec())
    }

    fn close(&self) {}
}

/// Writer over a [`MemoryStorage`]
pub struct MemoryDataWriter {
    storage: MemoryStorage,
    current: Option<u64>,
}

impl DataWriter for MemoryDataWriter {
    fn open_segment(&mut self, start: u64) -> Result<()> {
        self.storage.segments.write().entry(start).or_default();
        self.current = Some(start);
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<usize> {
        let start = self
            .current
            .ok_or_else(|| StoreError::InvalidArgument("no segment open for append".to_string()))?;
        let mut segments = self.storage.segments.write();
        let segment = segments
            .get_mut(&start)
            .ok_or_else(|| missing_segment(start))?;
        segment.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn truncate_segment(&mut self, start: u64, len: u64) -> Result<()> {
        let mut segments = self.storage.segments.write();
        let segment = segments
            .get_mut(&start)
            .ok_or_else(|| missing_segment(start))?;
        segment.truncate(len as usize);
        Ok(())
    }

    fn remove_segment(&mut self, start: u64) -> Result<()> {
        if self.current == Some(start) {
            self.current = None;
        }
        self.storage
            .segments
            .write()
            .remove(&start)
            .map(|_| ())
            .ok_or_else(|| missing_segment(start))
    }

    fn close(&mut self) -> Result<()> {
        self.current = None;
        Ok(())
    }
}
