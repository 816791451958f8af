//! Virtual file system
//!
//! Files live in two ordered indexes:
//!
//! ```text
//! paths:    "dir/name"            ──► FileRecord { descriptor, created }  (bincode)
//! contents: ClusterKey(fd, n)     ──► cluster bytes (through the converter)
//! ```
//!
//! A file's length is never stored: it is the end of its last cluster.
//! Writes rewrite every touched cluster in full and zero-fill gaps, so a
//! file's cluster numbers always run from 0 without holes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::VfsConfig;
use crate::error::{Result, StoreError};
use crate::index::OrderedIndex;

use super::cluster::{Cluster, ClusterKey};
use super::iterator::{ClusterIterator, ClusterSettings};
use super::stream::VfsInputStream;

/// Handle to a virtual file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: String,
    descriptor: u64,
    created: u64,
}

impl File {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn descriptor(&self) -> u64 {
        self.descriptor
    }

    /// Creation time in milliseconds since the Unix epoch
    pub fn created(&self) -> u64 {
        self.created
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    descriptor: u64,
    created: u64,
}

/// Files of arbitrary length stored as clusters in an ordered index
pub struct VirtualFileSystem<I: OrderedIndex> {
    settings: ClusterSettings,
    paths: I,
    contents: I,
    next_descriptor: AtomicU64,
    /// Bumped by every mutation; streams compare it to detect staleness
    epoch: AtomicU64,
    write_lock: Mutex<()>,
}

impl<I: OrderedIndex> VirtualFileSystem<I> {
    pub fn new(config: VfsConfig, paths: I, contents: I) -> Result<Self> {
        Self::with_settings(ClusterSettings::new(config.clustering), paths, contents)
    }

    pub fn with_settings(settings: ClusterSettings, paths: I, contents: I) -> Result<Self> {
        settings.strategy.validate()?;

        let mut max_descriptor = None;
        let mut files = 0usize;
        {
            let mut cursor = paths.open_cursor()?;
            let mut found = cursor.seek_key_or_greater(&[])?;
            while found {
                if let Some(value) = cursor.value() {
                    let record: FileRecord = bincode::deserialize(value)?;
                    max_descriptor = max_descriptor.max(Some(record.descriptor));
                    files += 1;
                }
                found = cursor.next()?;
            }
            cursor.close();
        }

        let next_descriptor = max_descriptor.map_or(0, |d| d + 1);
        info!(
            files,
            next_descriptor,
            strategy = ?settings.strategy,
            "Virtual file system opened"
        );

        Ok(Self {
            settings,
            paths,
            contents,
            next_descriptor: AtomicU64::new(next_descriptor),
            epoch: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        })
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    pub fn paths(&self) -> &I {
        &self.paths
    }

    pub fn contents(&self) -> &I {
        &self.contents
    }

    /// Current mutation epoch
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    // =========================================================================
    // Files
    // =========================================================================

    pub fn create_file(&self, path: &str) -> Result<File> {
        let _guard = self.write_lock.lock();
        if self.paths.get(path.as_bytes())?.is_some() {
            return Err(StoreError::FileExists(path.to_string()));
        }
        self.insert_file(path)
    }

    pub fn open_file(&self, path: &str) -> Result<Option<File>> {
        match self.paths.get(path.as_bytes())? {
            Some(value) => {
                let record: FileRecord = bincode::deserialize(&value)?;
                Ok(Some(File {
                    path: path.to_string(),
                    descriptor: record.descriptor,
                    created: record.created,
                }))
            }
            None => Ok(None),
        }
    }

    /// Like [`open_file`](Self::open_file), failing with `FileNotFound`
    pub fn open_existing_file(&self, path: &str) -> Result<File> {
        self.open_file(path)?
            .ok_or_else(|| StoreError::FileNotFound(path.to_string()))
    }

    pub fn open_or_create_file(&self, path: &str) -> Result<File> {
        let _guard = self.write_lock.lock();
        match self.open_file(path)? {
            Some(file) => Ok(file),
            None => self.insert_file(path),
        }
    }

    fn insert_file(&self, path: &str) -> Result<File> {
        let descriptor = self.next_descriptor.fetch_add(1, Ordering::AcqRel);
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let record = FileRecord {
            descriptor,
            created,
        };
        self.paths
            .put(path.as_bytes(), &bincode::serialize(&record)?)?;

        info!(path, descriptor, "File created");
        Ok(File {
            path: path.to_string(),
            descriptor,
            created,
        })
    }

    /// Remove a file and all of its clusters
    pub fn delete_file(&self, path: &str) -> Result<Option<File>> {
        let _guard = self.write_lock.lock();
        let Some(file) = self.open_file(path)? else {
            return Ok(None);
        };

        let mut iterator = self.cluster_iterator(&file, 0)?;
        let mut removed = 0u64;
        while iterator.has_cluster() {
            iterator.delete_current()?;
            iterator.move_to_next()?;
            removed += 1;
        }
        iterator.close();

        self.paths.delete(path.as_bytes())?;
        self.bump_epoch();
        info!(path, descriptor = file.descriptor, clusters = removed, "File deleted");
        Ok(Some(file))
    }

    /// Give a file a new path. Returns `false` if `from` does not exist.
    pub fn rename_file(&self, from: &str, to: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        if self.paths.get(to.as_bytes())?.is_some() {
            return Err(StoreError::FileExists(to.to_string()));
        }
        let Some(record) = self.paths.get(from.as_bytes())? else {
            return Ok(false);
        };
        self.paths.put(to.as_bytes(), &record)?;
        self.paths.delete(from.as_bytes())?;
        self.bump_epoch();
        debug!(from, to, "File renamed");
        Ok(true)
    }

    /// All file paths, in order
    pub fn file_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(self.paths.len());
        let mut cursor = self.paths.open_cursor()?;
        let mut found = cursor.seek_key_or_greater(&[])?;
        while found {
            if let Some(key) = cursor.key() {
                names.push(String::from_utf8_lossy(key).into_owned());
            }
            found = cursor.next()?;
        }
        cursor.close();
        Ok(names)
    }

    pub fn file_count(&self) -> usize {
        self.paths.len()
    }

    /// End of the file's last cluster
    pub fn file_length(&self, file: &File) -> Result<u64> {
        let mut iterator = self.cluster_iterator(file, 0)?;
        let mut length = 0;
        while iterator.has_cluster() {
            length = iterator.current()?.end_position();
            iterator.move_to_next()?;
        }
        Ok(length)
    }

    /// Iterator over `file`'s clusters, positioned at `position`
    pub fn cluster_iterator(&self, file: &File, position: u64) -> Result<ClusterIterator<'_>> {
        let cursor = self.contents.open_cursor()?;
        ClusterIterator::new(&self.settings, cursor, file.descriptor, position)
    }

    // =========================================================================
    // Contents
    // =========================================================================

    /// Write `data` at `position`, zero-filling any gap past the current end
    pub fn write(&self, file: &File, position: u64, data: &[u8]) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write_locked(file, position, data)
    }

    /// Append `data` to the end of the file. Returns the new length.
    pub fn append(&self, file: &File, data: &[u8]) -> Result<u64> {
        let _guard = self.write_lock.lock();
        let length = self.file_length(file)?;
        self.write_locked(file, length, data)?;
        Ok(length + data.len() as u64)
    }

    fn write_locked(&self, file: &File, position: u64, data: &[u8]) -> Result<()> {
        let length = self.file_length(file)?;
        let (mut position, data) = if position > length {
            let mut filled = vec![0u8; (position - length) as usize];
            filled.extend_from_slice(data);
            (length, filled)
        } else {
            (position, data.to_vec())
        };
        if data.is_empty() {
            return Ok(());
        }

        let strategy = self.settings.strategy;
        let converter = self.settings.converter();
        let mut written = 0usize;
        let mut clusters = 0u64;
        while written < data.len() {
            let (number, start) = strategy.locate(position);
            let size = strategy.cluster_size(number) as usize;
            let offset = (position - start) as usize;
            let take = (size - offset).min(data.len() - written);

            let key = ClusterKey::new(file.descriptor, number).encode();
            let mut raw = match self.contents.get(&key)? {
                Some(stored) => Cluster::decode(number, &stored, converter)?.data().to_vec(),
                None => Vec::new(),
            };
            if raw.len() < offset + take {
                raw.resize(offset + take, 0);
            }
            raw[offset..offset + take].copy_from_slice(&data[written..written + take]);
            self.contents.put(&key, &Cluster::encode(&raw, converter))?;

            written += take;
            position += take as u64;
            clusters += 1;
        }

        self.bump_epoch();
        debug!(
            descriptor = file.descriptor,
            bytes = written,
            clusters,
            "File written"
        );
        Ok(())
    }

    /// Cut the file down to `length` bytes. Longer lengths are a no-op.
    pub fn truncate(&self, file: &File, length: u64) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut iterator = self.cluster_iterator(file, length)?;
        if !iterator.has_cluster() {
            return Ok(());
        }

        let first = iterator.current()?.clone();
        let keep = length.saturating_sub(first.starting_position()) as usize;
        if keep > 0 {
            let key = ClusterKey::new(file.descriptor, first.number()).encode();
            let converter = self.settings.converter();
            self.contents
                .put(&key, &Cluster::encode(&first.data()[..keep], converter))?;
            iterator.move_to_next()?;
        }

        let mut removed = 0u64;
        while iterator.has_cluster() {
            iterator.delete_current()?;
            iterator.move_to_next()?;
            removed += 1;
        }
        iterator.close();

        self.bump_epoch();
        debug!(descriptor = file.descriptor, length, removed, "File truncated");
        Ok(())
    }

    /// Stream the file's bytes from `position`
    pub fn read_file(&self, file: &File, position: u64) -> Result<VfsInputStream<'_>> {
        let epoch = self.epoch();
        let iterator = self.cluster_iterator(file, position)?;
        Ok(VfsInputStream::new(iterator, position, &self.epoch, epoch))
    }

    /// Read up to `buf.len()` bytes at `position`. Returns the count read,
    /// short only at end of file.
    pub fn read_at(&self, file: &File, position: u64, buf: &mut [u8]) -> Result<usize> {
        let mut stream = self.read_file(file, position)?;
        stream.read(buf)
    }

    /// Whole content of the file
    pub fn read_all(&self, file: &File) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut stream = self.read_file(file, 0)?;
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }
}
