//! Environment
//!
//! Ties one data directory to exactly one [`Log`], the two log-backed
//! indexes the file system needs, and the [`VirtualFileSystem`] itself.
//!
//! ```text
//!   Environment
//!     ├── Log (Arc)            {data_dir}/*.xd
//!     └── VirtualFileSystem
//!           ├── paths:    LogIndex (structure 1)
//!           └── contents: LogIndex (structure 2)
//! ```
//!
//! Everything is built in `open`; there is no lazy construction.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::backup::{BackupStrategy, Backupable};
use crate::config::Config;
use crate::error::Result;
use crate::index::LogIndex;
use crate::log::Log;
use crate::vfs::{ClusterSettings, VirtualFileSystem};

/// Structure id of the path index
pub const PATHS_STRUCTURE_ID: u64 = 1;

/// Structure id of the cluster contents index
pub const CONTENTS_STRUCTURE_ID: u64 = 2;

pub struct Environment {
    config: Config,
    log: Arc<Log>,
    vfs: VirtualFileSystem<LogIndex>,
}

impl Environment {
    pub fn open(config: Config) -> Result<Self> {
        let settings = ClusterSettings::new(config.vfs.clustering);
        Self::open_with_settings(config, settings)
    }

    /// Open with a converter or cancellation provider installed
    pub fn open_with_settings(config: Config, settings: ClusterSettings) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let log = Arc::new(Log::open_dir(&config.data_dir, config.log.clone())?);
        let paths = LogIndex::open(Arc::clone(&log), PATHS_STRUCTURE_ID)?;
        let contents = LogIndex::open(Arc::clone(&log), CONTENTS_STRUCTURE_ID)?;
        let vfs = VirtualFileSystem::with_settings(settings, paths, contents)?;

        info!(
            data_dir = %config.data_dir.display(),
            files = vfs.file_count(),
            "Environment opened"
        );
        Ok(Self { config, log, vfs })
    }

    /// Open `path` with default settings
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::builder().data_dir(path.as_ref()).build())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    /// Shared handle to the log
    pub fn log_handle(&self) -> Arc<Log> {
        Arc::clone(&self.log)
    }

    pub fn vfs(&self) -> &VirtualFileSystem<LogIndex> {
        &self.vfs
    }

    pub fn is_closed(&self) -> bool {
        self.log.is_closed()
    }

    /// Close the log. A second call is a no-op.
    pub fn close(&self) -> Result<()> {
        self.log.close()
    }
}

impl Backupable for Environment {
    fn backup_strategy(&self) -> Box<dyn BackupStrategy + '_> {
        self.log.backup_strategy()
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to close environment");
        }
    }
}
