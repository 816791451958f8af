//! The append-only log
//!
//! Owns the tail-segment writer and the page cache behind a single mutex.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};

use crate::config::{LogConfig, SyncStrategy};
use crate::error::{Result, StoreError};
use crate::io::{DataReader, DataWriter, FileDataReader, FileDataWriter, SegmentInfo};

use super::cache::{CacheStats, PageCache};
use super::iterator::LoggableIterator;
use super::loggable::{Loggable, RecordHeader, MAX_HEADER_SIZE, PADDING_TYPE};
use super::recovery::RecoveryResult;

/// Append-only store of loggables addressed by absolute offset
///
/// ## Concurrency:
/// - `state`: the only mutable state; appends, reads (which populate the
///   cache) and close all serialize on it
/// - All methods use `&self`, so a `Log` is shared by reference or `Arc`
pub struct Log {
    config: LogConfig,
    reader: Box<dyn DataReader>,
    state: Mutex<LogState>,
    recovery: RecoveryResult,
}

pub(super) struct LogState {
    writer: Box<dyn DataWriter>,
    cache: PageCache,
    /// Address the next record would start at (before any sealing)
    high_address: u64,
    /// Segment the writer currently appends to
    tail_segment: Option<u64>,
    /// Start addresses of all live segments
    segments: BTreeSet<u64>,
    /// Appends since the last fsync
    uncommitted: usize,
    closed: bool,
    /// A torn append could not be rolled back
    failed: bool,
}

impl LogState {
    pub(super) fn high_address(&self) -> u64 {
        self.high_address
    }

    /// First live segment starting at or after `start`
    pub(super) fn live_segment_from(&self, start: u64) -> Option<u64> {
        self.segments.range(start..).next().copied()
    }
}

impl Log {
    /// Open a log over the given collaborators
    ///
    /// On startup:
    /// 1. Validate the configuration
    /// 2. Discover existing segments and check their alignment
    /// 3. Scan the tail segment, truncating a torn suffix
    pub fn open<R, W>(config: LogConfig, reader: R, writer: W) -> Result<Self>
    where
        R: DataReader + 'static,
        W: DataWriter + 'static,
    {
        config.validate()?;

        let found = reader.segments()?;
        let mut segments = BTreeSet::new();
        for (i, segment) in found.iter().enumerate() {
            if segment.start % config.file_size != 0 {
                return Err(StoreError::corruption(
                    segment.start,
                    format!("segment start is not a multiple of file size {}", config.file_size),
                ));
            }
            if segment.length > config.file_size {
                return Err(StoreError::corruption(
                    segment.start,
                    format!(
                        "segment holds {} bytes, more than file size {}",
                        segment.length, config.file_size
                    ),
                ));
            }
            let is_tail = i + 1 == found.len();
            if !is_tail && segment.length != config.file_size {
                return Err(StoreError::corruption(
                    segment.start,
                    format!("sealed segment holds only {} bytes", segment.length),
                ));
            }
            segments.insert(segment.start);
        }

        let high_address = found.last().map(|s| s.start + s.length).unwrap_or(0);
        let state = LogState {
            writer: Box::new(writer),
            cache: PageCache::new(config.cache_capacity),
            high_address,
            tail_segment: None,
            segments,
            uncommitted: 0,
            closed: false,
            failed: false,
        };

        let mut log = Self {
            config,
            reader: Box::new(reader),
            state: Mutex::new(state),
            recovery: RecoveryResult::default(),
        };
        log.recovery = log.recover_tail(&found)?;

        info!(
            segments = log.recovery.segments_found,
            high_address = log.recovery.high_address,
            truncated = log.recovery.truncated_bytes,
            "Log opened"
        );
        Ok(log)
    }

    /// Open a log whose segments are files in `dir`, creating it if needed
    pub fn open_dir(dir: &Path, config: LogConfig) -> Result<Self> {
        let writer = FileDataWriter::new(dir)?;
        let reader = FileDataReader::new(dir);
        Self::open(config, reader, writer)
    }

    /// Append a record, returning its address
    ///
    /// A record never spans segments: if it doesn't fit into the rest of
    /// the tail segment, the segment is padded to its end (sealed) and the
    /// record goes to the start of the next one.
    pub fn append(&self, loggable_type: u8, structure_id: u64, payload: &[u8]) -> Result<u64> {
        let bytes = Loggable::encode(loggable_type, structure_id, payload)?;
        let len = bytes.len() as u64;
        let file_size = self.config.file_size;
        if len > file_size {
            return Err(StoreError::RecordTooLarge {
                size: len,
                max: file_size,
            });
        }

        let mut state = self.lock()?;
        let mut address = state.high_address;
        let offset = address & self.segment_mask();

        if offset != 0 && offset + len > file_size {
            let padding = (file_size - offset) as usize;
            self.write_step(&mut state, address, &vec![PADDING_TYPE; padding], false)?;
            debug!(segment = address - offset, padding, "Sealed segment");
            address += padding as u64;
        }

        let sync = match self.config.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => state.uncommitted + 1 >= count,
        };
        self.write_step(&mut state, address, &bytes, sync)?;
        state.uncommitted = if sync { 0 } else { state.uncommitted + 1 };

        trace!(address, len, loggable_type, "Appended loggable");
        Ok(address)
    }

    /// Read the record starting at `address`
    pub fn read(&self, address: u64) -> Result<Loggable> {
        let mut state = self.lock()?;
        match self.read_at(&mut state, address)? {
            Some(loggable) => Ok(loggable),
            None => Err(StoreError::corruption(
                address,
                "address points into segment padding",
            )),
        }
    }

    /// Iterate records starting at `address`, skipping segment padding
    pub fn iter(&self, address: u64) -> LoggableIterator<'_> {
        LoggableIterator::new(self, address)
    }

    /// Force an fsync of the tail segment
    pub fn flush(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.writer.sync()?;
        state.uncommitted = 0;
        Ok(())
    }

    /// Delete a sealed segment (space reclamation). Readers holding
    /// addresses into it get the reader's I/O error from then on.
    pub fn remove_segment(&self, start: u64) -> Result<()> {
        let mut state = self.lock()?;
        if !state.segments.contains(&start) {
            return Err(StoreError::InvalidArgument(format!(
                "no segment starts at {start}"
            )));
        }
        if state.tail_segment == Some(start) || self.segment_start(state.high_address) == start {
            return Err(StoreError::InvalidArgument(format!(
                "segment {start} is the tail segment"
            )));
        }

        state.writer.remove_segment(start)?;
        state.segments.remove(&start);
        state.cache.remove_range(start, start + self.config.file_size);
        self.reader.close();
        info!(start, "Removed segment");
        Ok(())
    }

    /// Close the log: sync, release handles, drop cached pages.
    /// A second call is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.cache.clear();
        self.reader.close();
        state.writer.close()?;
        info!(high_address = state.high_address, "Log closed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Address the next record would start at
    pub fn high_address(&self) -> u64 {
        self.state.lock().high_address
    }

    /// Start address of the oldest live segment
    pub fn first_address(&self) -> u64 {
        self.state.lock().segments.first().copied().unwrap_or(0)
    }

    pub fn segment_count(&self) -> usize {
        self.state.lock().segments.len()
    }

    pub fn segment_starts(&self) -> Vec<u64> {
        self.state.lock().segments.iter().copied().collect()
    }

    /// Segments as the reader sees them (paths included for file logs)
    pub fn segment_files(&self) -> Result<Vec<SegmentInfo>> {
        drop(self.lock()?);
        self.reader.segments()
    }

    /// Appends since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.state.lock().uncommitted
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.state.lock().cache.stats()
    }

    /// What open() found and repaired
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    pub(super) fn lock(&self) -> Result<MutexGuard<'_, LogState>> {
        let state = self.state.lock();
        if state.closed {
            return Err(StoreError::LogClosed);
        }
        if state.failed {
            return Err(StoreError::LogFailed);
        }
        Ok(state)
    }

    fn segment_mask(&self) -> u64 {
        self.config.file_size - 1
    }

    pub(super) fn segment_start(&self, address: u64) -> u64 {
        address & !self.segment_mask()
    }

    fn ensure_segment(&self, state: &mut LogState, start: u64) -> Result<()> {
        if state.tail_segment != Some(start) {
            state.writer.open_segment(start)?;
            state.tail_segment = Some(start);
            if state.segments.insert(start) {
                debug!(start, "Allocated segment");
            }
        }
        Ok(())
    }

    /// Write `bytes` at `address` (the current high address) and advance
    /// the high address past them.
    ///
    /// On failure the segment is cut back to `address` and the high address
    /// stays put, so the next append reuses the same address. If even the
    /// cut fails, the log is marked failed.
    fn write_step(&self, state: &mut LogState, address: u64, bytes: &[u8], sync: bool) -> Result<()> {
        let segment = self.segment_start(address);
        self.ensure_segment(state, segment)?;

        if let Err(e) = Self::write_through(state, bytes, sync) {
            self.roll_back(state, segment, address - segment, &e);
            return Err(e);
        }
        state.high_address = address + bytes.len() as u64;
        Ok(())
    }

    fn write_through(state: &mut LogState, bytes: &[u8], sync: bool) -> Result<()> {
        let written = state.writer.append(bytes)?;
        if written != bytes.len() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short append: {written} of {} bytes", bytes.len()),
            )));
        }
        // Page reads go to the reader, which only sees flushed bytes
        state.writer.flush()?;
        if sync {
            state.writer.sync()?;
        }
        Ok(())
    }

    fn roll_back(&self, state: &mut LogState, segment: u64, keep: u64, cause: &StoreError) {
        match state.writer.truncate_segment(segment, keep) {
            Ok(()) => {
                warn!(segment, kept = keep, error = %cause, "Rolled back failed append");
            }
            Err(e) => {
                error!(segment, kept = keep, error = %e, "Rollback failed, log is unusable");
                state.failed = true;
            }
        }
    }

    /// Decode the record at `address`; `Ok(None)` means segment padding
    pub(super) fn read_at(&self, state: &mut LogState, address: u64) -> Result<Option<Loggable>> {
        if address >= state.high_address {
            return Err(StoreError::InvalidAddress {
                address,
                high_address: state.high_address,
            });
        }

        let limit = (self.segment_start(address) + self.config.file_size).min(state.high_address);
        let available = (limit - address) as usize;
        let head = self.read_bytes(state, address, available.min(MAX_HEADER_SIZE))?;
        if head[0] == PADDING_TYPE {
            return Ok(None);
        }

        let header = RecordHeader::decode(address, &head)?;
        if address + header.total_len() > limit {
            return Err(StoreError::corruption(
                address,
                format!(
                    "record of {} bytes overruns its segment ({} bytes available)",
                    header.total_len(),
                    available
                ),
            ));
        }

        let payload = self.read_bytes(
            state,
            address + header.header_len as u64,
            header.payload_len as usize,
        )?;
        let crc = crc32fast::hash(&payload);
        if crc != header.crc {
            return Err(StoreError::corruption(
                address,
                format!("CRC mismatch: expected {:#010x}, got {crc:#010x}", header.crc),
            ));
        }

        Ok(Some(Loggable {
            address,
            loggable_type: header.loggable_type,
            structure_id: header.structure_id,
            payload: Bytes::from(payload),
        }))
    }

    /// Copy `len` bytes starting at `address` out of (possibly several) pages
    fn read_bytes(&self, state: &mut LogState, address: u64, len: usize) -> Result<Vec<u8>> {
        let page_mask = self.config.cache_page_size as u64 - 1;
        let mut out = Vec::with_capacity(len);
        let mut pos = address;

        while out.len() < len {
            let page_start = pos & !page_mask;
            let page = self.page(state, page_start)?;
            let in_page = (pos - page_start) as usize;
            let take = (len - out.len()).min(page.len().saturating_sub(in_page));
            if take == 0 {
                return Err(StoreError::corruption(pos, "read past the end of written data"));
            }
            out.extend_from_slice(&page[in_page..in_page + take]);
            pos += take as u64;
        }
        Ok(out)
    }

    /// Fetch one page, through the cache. Pages not yet fully written are
    /// read but not cached.
    fn page(&self, state: &mut LogState, page_start: u64) -> Result<Bytes> {
        if let Some(page) = state.cache.get(page_start) {
            return Ok(page);
        }

        let page_size = self.config.cache_page_size as u64;
        let segment = self.segment_start(page_start);
        let available = page_size.min(state.high_address.saturating_sub(page_start));
        let data = Bytes::from(self.reader.read_page(
            segment,
            page_start - segment,
            available as usize,
        )?);
        trace!(page_start, available, "Page cache miss");

        if available == page_size {
            state.cache.insert(page_start, data.clone());
        }
        Ok(data)
    }

    /// Scan the tail segment and cut off anything after the last intact record
    fn recover_tail(&self, found: &[SegmentInfo]) -> Result<RecoveryResult> {
        let mut result = RecoveryResult {
            segments_found: found.len(),
            ..RecoveryResult::default()
        };
        let Some(tail) = found.last() else {
            return Ok(result);
        };

        let mut state = self.state.lock();
        let end = tail.start + tail.length;
        let sealed = tail.length == self.config.file_size;
        let mut address = tail.start;

        while address < end {
            match self.read_at(&mut state, address) {
                Ok(Some(loggable)) => {
                    result.records_verified += 1;
                    address = loggable.end_address();
                }
                Ok(None) if sealed => {
                    address = end;
                }
                Ok(None) => break,
                Err(e) if e.is_corruption() => {
                    debug!(address, error = %e, "Tail scan stopped");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if address < end {
            let keep = address - tail.start;
            warn!(
                segment = tail.start,
                kept = keep,
                truncated = end - address,
                "Truncating torn tail segment"
            );
            state.writer.truncate_segment(tail.start, keep)?;
            state.cache.remove_range(tail.start, end);
            state.high_address = address;
            result.truncated_bytes = end - address;
        }
        result.high_address = state.high_address;
        Ok(result)
    }
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("config", &self.config)
            .field("high_address", &self.high_address())
            .finish()
    }
}
