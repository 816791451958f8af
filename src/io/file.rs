//! File-backed segment reader and writer
//!
//! One file per segment, named after the segment's start address.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, StoreError};

use super::{DataReader, DataWriter, SegmentInfo};

/// The file extension used for segment files.
pub const SEGMENT_EXTENSION: &str = "xd";

/// Canonical file name for the segment starting at `start`.
///
/// Format: `0000000000400000.xd`
pub fn segment_name(start: u64) -> String {
    format!("{start:016x}.{SEGMENT_EXTENSION}")
}

/// Parse a segment start address from a file name.
///
/// Returns `None` if the name does not match the expected pattern.
pub fn parse_segment_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(&format!(".{SEGMENT_EXTENSION}"))?;
    if stem.len() != 16 {
        return None;
    }
    u64::from_str_radix(stem, 16).ok()
}

fn segment_path(dir: &Path, start: u64) -> PathBuf {
    dir.join(segment_name(start))
}

// =============================================================================
// Reader
// =============================================================================

/// Reads pages from segment files in a directory
pub struct FileDataReader {
    dir: PathBuf,
    /// Open handles by segment start (seek position is shared, so reads lock)
    handles: Mutex<HashMap<u64, File>>,
}

impl FileDataReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DataReader for FileDataReader {
    fn segments(&self) -> Result<Vec<SegmentInfo>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut segments = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(start) = parse_segment_name(&name.to_string_lossy()) {
                segments.push(SegmentInfo {
                    start,
                    length: entry.metadata()?.len(),
                    path: Some(entry.path()),
                });
            }
        }
        segments.sort_by_key(|s| s.start);

        debug!(
            count = segments.len(),
            dir = %self.dir.display(),
            "Discovered segments"
        );
        Ok(segments)
    }

    fn read_page(&self, segment_start: u64, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut handles = self.handles.lock();
        let file = match handles.entry(segment_start) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(File::open(segment_path(&self.dir, segment_start))?)
            }
        };

        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn close(&self) {
        self.handles.lock().clear();
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Appends to the tail segment file in a directory
pub struct FileDataWriter {
    dir: PathBuf,
    /// (segment start, buffered handle) of the append target
    current: Option<(u64, BufWriter<File>)>,
}

impl FileDataWriter {
    /// Create a writer, creating `dir` if it doesn't exist
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, current: None })
    }

    fn current(&mut self) -> Result<&mut BufWriter<File>> {
        self.current
            .as_mut()
            .map(|(_, w)| w)
            .ok_or_else(|| StoreError::InvalidArgument("no segment open for append".to_string()))
    }
}

impl DataWriter for FileDataWriter {
    fn open_segment(&mut self, start: u64) -> Result<()> {
        if let Some((current, _)) = &self.current {
            if *current == start {
                return Ok(());
            }
        }
        if let Some((_, mut writer)) = self.current.take() {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(segment_path(&self.dir, start))?;
        debug!(start, "Opened segment for append");
        self.current = Some((start, BufWriter::new(file)));
        Ok(())
    }

    fn append(&mut self, bytes: &[u8]) -> Result<usize> {
        self.current()?.write_all(bytes)?;
        Ok(bytes.len())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some((_, writer)) = self.current.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if let Some((_, writer)) = self.current.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    fn truncate_segment(&mut self, start: u64, len: u64) -> Result<()> {
        match self.current.as_mut() {
            Some((current, writer)) if *current == start => {
                writer.flush()?;
                writer.get_ref().set_len(len)?;
                writer.get_ref().sync_all()?;
            }
            _ => {
                let file = OpenOptions::new()
                    .write(true)
                    .open(segment_path(&self.dir, start))?;
                file.set_len(len)?;
                file.sync_all()?;
            }
        }
        Ok(())
    }

    fn remove_segment(&mut self, start: u64) -> Result<()> {
        if matches!(self.current, Some((current, _)) if current == start) {
            self.current = None;
        }
        fs::remove_file(segment_path(&self.dir, start))?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.sync()?;
        self.current = None;
        Ok(())
    }
}
