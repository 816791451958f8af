//! Configuration for logvfs
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StoreError};
use crate::log::MAX_HEADER_SIZE;
use crate::vfs::{ClusteringStrategy, CLUSTER_KEY_SIZE};

/// Main configuration for a logvfs environment
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all segment files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── 0000000000000000.xd   (first segment)
    ///     └── 0000000000800000.xd   (next segment, named by start address)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Log Configuration
    // -------------------------------------------------------------------------
    pub log: LogConfig,

    // -------------------------------------------------------------------------
    // VFS Configuration
    // -------------------------------------------------------------------------
    pub vfs: VfsConfig,
}

/// Layout and durability settings consumed by [`crate::log::Log`]
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Segment size in bytes (power of two)
    pub file_size: u64,

    /// Cache page size in bytes (power of two, divides `file_size`)
    pub cache_page_size: u32,

    /// Maximum number of pages held by the page cache
    pub cache_capacity: usize,

    /// How often segment writes are fsynced
    pub sync_strategy: SyncStrategy,
}

/// Segment sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced appends (balanced durability/performance)
    EveryNEntries { count: usize },
}

/// Settings consumed by [`crate::vfs::VirtualFileSystem`]
#[derive(Debug, Clone, Default)]
pub struct VfsConfig {
    /// Cluster sizing policy; part of the persisted format
    pub clustering: ClusteringStrategy,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_size: 8 * 1024 * 1024, // 8 MB
            cache_page_size: 64 * 1024, // 64 KB
            cache_capacity: 1024,
            sync_strategy: SyncStrategy::EveryNEntries { count: 100 },
        }
    }
}

impl LogConfig {
    /// Config with the given segment and page sizes, defaults elsewhere
    pub fn with_sizes(file_size: u64, cache_page_size: u32) -> Self {
        Self {
            file_size,
            cache_page_size,
            ..Self::default()
        }
    }

    /// Check size and alignment rules.
    ///
    /// Offset arithmetic in the log relies on bit masks, so both sizes must
    /// be powers of two; that also makes `file_size % cache_page_size == 0`
    /// whenever the page is not larger than the segment.
    pub fn validate(&self) -> Result<()> {
        if self.file_size == 0 {
            return Err(StoreError::Config("file_size must be positive".to_string()));
        }
        if self.cache_page_size == 0 {
            return Err(StoreError::Config(
                "cache_page_size must be positive".to_string(),
            ));
        }
        if !self.file_size.is_power_of_two() {
            return Err(StoreError::Config(format!(
                "file_size must be a power of two, got {}",
                self.file_size
            )));
        }
        if !self.cache_page_size.is_power_of_two() {
            return Err(StoreError::Config(format!(
                "cache_page_size must be a power of two, got {}",
                self.cache_page_size
            )));
        }
        if self.file_size % self.cache_page_size as u64 != 0 {
            return Err(StoreError::Config(format!(
                "cache_page_size {} does not divide file_size {}",
                self.cache_page_size, self.file_size
            )));
        }
        if self.cache_capacity == 0 {
            return Err(StoreError::Config(
                "cache_capacity must be at least one page".to_string(),
            ));
        }
        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(StoreError::Config(
                "EveryNEntries sync count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./logvfs_data"),
            log: LogConfig::default(),
            vfs: VfsConfig::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validate the log layout and the clustering strategy
    ///
    /// The largest cluster, stored as one index put, must fit into a segment.
    pub fn validate(&self) -> Result<()> {
        self.log.validate()?;
        self.vfs.clustering.validate()?;

        // header + key length + key + converter trailer
        let overhead = (MAX_HEADER_SIZE + 4 + CLUSTER_KEY_SIZE + 4) as u64;
        let largest = self.vfs.clustering.max_cluster_size().saturating_add(overhead);
        if largest > self.log.file_size {
            return Err(StoreError::Config(format!(
                "clusters of up to {} bytes do not fit into segments of {} bytes",
                self.vfs.clustering.max_cluster_size(),
                self.log.file_size
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all segments)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment size (in bytes)
    pub fn file_size(mut self, size: u64) -> Self {
        self.config.log.file_size = size;
        self
    }

    /// Set the cache page size (in bytes)
    pub fn cache_page_size(mut self, size: u32) -> Self {
        self.config.log.cache_page_size = size;
        self
    }

    /// Set the page cache capacity (in pages)
    pub fn cache_capacity(mut self, pages: usize) -> Self {
        self.config.log.cache_capacity = pages;
        self
    }

    /// Set the segment sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.log.sync_strategy = strategy;
        self
    }

    /// Set the clustering strategy used by the VFS
    pub fn clustering(mut self, strategy: ClusteringStrategy) -> Self {
        self.config.vfs.clustering = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
