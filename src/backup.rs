//! Backup hooks
//!
//! A [`BackupStrategy`] describes what to copy; [`run_backup`] drives it.
//!
//! ```text
//! before_backup ──► list_files ──► for each: is_interrupted? accept_file ──► copy
//!                                                        │
//!                       after_backup ◄───────────────────┘   (on_error on failure)
//! ```

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::log::Log;

/// A file to be backed up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    pub path: PathBuf,
    /// Name of the copy inside the target directory
    pub name: String,
    pub size: u64,
}

pub trait BackupStrategy {
    fn before_backup(&mut self) -> Result<()> {
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<BackupFile>>;

    fn after_backup(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_interrupted(&self) -> bool {
        false
    }

    fn on_error(&mut self, _error: &StoreError) {}

    /// Number of leading bytes of `file` to copy; zero skips the file
    fn accept_file(&self, file: &BackupFile) -> u64 {
        file.size
    }
}

/// Backs up nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyBackupStrategy;

impl BackupStrategy for EmptyBackupStrategy {
    fn list_files(&self) -> Result<Vec<BackupFile>> {
        Ok(Vec::new())
    }
}

/// Something that knows how to back itself up
pub trait Backupable {
    fn backup_strategy(&self) -> Box<dyn BackupStrategy + '_>;
}

/// Copies the log's segment files as they are at `before_backup`
pub struct LogBackupStrategy<'a> {
    log: &'a Log,
    /// Tail length captured at start; later appends are not copied
    high_address: u64,
}

impl BackupStrategy for LogBackupStrategy<'_> {
    fn before_backup(&mut self) -> Result<()> {
        self.log.flush()?;
        self.high_address = self.log.high_address();
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<BackupFile>> {
        let files = self
            .log
            .segment_files()?
            .into_iter()
            .filter_map(|segment| {
                let path = segment.path?;
                let name = path.file_name()?.to_string_lossy().into_owned();
                Some(BackupFile {
                    path,
                    name,
                    size: segment.length,
                })
            })
            .collect();
        Ok(files)
    }

    fn accept_file(&self, file: &BackupFile) -> u64 {
        let start = crate::io::parse_segment_name(&file.name).unwrap_or(0);
        file.size.min(self.high_address.saturating_sub(start))
    }
}

impl Backupable for Log {
    fn backup_strategy(&self) -> Box<dyn BackupStrategy + '_> {
        Box::new(LogBackupStrategy {
            log: self,
            high_address: 0,
        })
    }
}

/// Outcome of [`run_backup`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupSummary {
    pub files_copied: usize,
    pub files_skipped: usize,
    pub bytes_copied: u64,
}

/// Copy everything `strategy` lists into `target_dir`
pub fn run_backup(strategy: &mut dyn BackupStrategy, target_dir: &Path) -> Result<BackupSummary> {
    let result = match strategy.before_backup() {
        Ok(()) => copy_files(&*strategy, target_dir),
        Err(e) => Err(e),
    };
    let result = match (result, strategy.after_backup()) {
        (Ok(summary), Ok(())) => Ok(summary),
        (Err(e), _) | (Ok(_), Err(e)) => Err(e),
    };

    match result {
        Ok(summary) => {
            info!(
                target = %target_dir.display(),
                files = summary.files_copied,
                skipped = summary.files_skipped,
                bytes = summary.bytes_copied,
                "Backup complete"
            );
            Ok(summary)
        }
        Err(e) => {
            warn!(target = %target_dir.display(), error = %e, "Backup failed");
            strategy.on_error(&e);
            Err(e)
        }
    }
}

fn copy_files(strategy: &dyn BackupStrategy, target_dir: &Path) -> Result<BackupSummary> {
    fs::create_dir_all(target_dir)?;
    let mut summary = BackupSummary::default();

    for file in strategy.list_files()? {
        if strategy.is_interrupted() {
            return Err(StoreError::BackupInterrupted);
        }
        let accepted = strategy.accept_file(&file).min(file.size);
        if accepted == 0 {
            summary.files_skipped += 1;
            continue;
        }

        let mut source = fs::File::open(&file.path)?.take(accepted);
        let mut target = fs::File::create(target_dir.join(&file.name))?;
        let copied = io::copy(&mut source, &mut target)?;
        target.sync_all()?;

        debug!(file = %file.name, bytes = copied, "Backed up file");
        summary.files_copied += 1;
        summary.bytes_copied += copied;
    }
    Ok(summary)
}
