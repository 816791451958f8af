//! Random-access input
//!
//! Wraps a [`VfsInputStream`] with a file pointer. Seeking forward inside
//! the current cluster skips; anything else reopens the stream. An obsolete
//! stream keeps being read until it fails.
//!
//! A `DataCorruption` error read through a stream that has gone obsolete
//! may be caused by a concurrent rewrite rather than real damage. In that
//! case the stream is reopened at the same position and the read retried.
//! Corruption on a current stream is returned as is.

use tracing::warn;

use crate::error::{Result, StoreError};
use crate::index::OrderedIndex;

use super::fs::{File, VirtualFileSystem};
use super::stream::VfsInputStream;

pub struct RandomAccessInput<'a, I: OrderedIndex> {
    vfs: &'a VirtualFileSystem<I>,
    file: File,
    input: Option<VfsInputStream<'a>>,
    position: u64,
}

impl<'a, I: OrderedIndex> RandomAccessInput<'a, I> {
    /// Open the file at `path` for random access
    pub fn open(vfs: &'a VirtualFileSystem<I>, path: &str) -> Result<Self> {
        let file = vfs.open_existing_file(path)?;
        Ok(Self::at(vfs, file, 0))
    }

    pub fn at(vfs: &'a VirtualFileSystem<I>, file: File, position: u64) -> Self {
        Self {
            vfs,
            file,
            input: None,
            position,
        }
    }

    /// A second, independent input on the same file
    pub fn reopen_at(&self, position: u64) -> Self {
        Self::at(self.vfs, self.file.clone(), position)
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn file_pointer(&self) -> u64 {
        self.position
    }

    pub fn length(&self) -> Result<u64> {
        self.vfs.file_length(&self.file)
    }

    pub fn seek(&mut self, position: u64) -> Result<()> {
        if position == self.position {
            return Ok(());
        }

        if position > self.position && self.input.is_some() {
            let to_skip = position - self.position;
            let strategy = self.vfs.settings().strategy;
            let cluster_size = strategy.first_cluster_size();
            let cheap = !strategy.is_linear()
                || (self.position % cluster_size) + to_skip < cluster_size;
            if cheap {
                let input = self.input()?;
                if input.skip(to_skip)? == to_skip {
                    self.position = position;
                    return Ok(());
                }
            }
        }

        self.close();
        self.position = position;
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        loop {
            let result = self.input()?.read_byte();
            match result {
                Ok(Some(byte)) => {
                    self.position += 1;
                    return Ok(byte);
                }
                Ok(None) => return Err(self.eof(1)),
                Err(e) => self.retry_or_fail(e)?,
            }
        }
    }

    /// Fill `buf` completely from the file pointer
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        loop {
            let result = self.input()?.read(buf);
            match result {
                Ok(n) if n == buf.len() => {
                    self.position += n as u64;
                    return Ok(());
                }
                Ok(n) => {
                    self.position += n as u64;
                    return Err(self.eof(buf.len()));
                }
                Err(e) => self.retry_or_fail(e)?,
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(mut input) = self.input.take() {
            input.close();
        }
    }

    fn input(&mut self) -> Result<&mut VfsInputStream<'a>> {
        let input = match self.input.take() {
            Some(input) => input,
            None => self.vfs.read_file(&self.file, self.position)?,
        };
        Ok(self.input.insert(input))
    }

    /// Swallow corruption seen through an obsolete stream so the caller
    /// retries on a fresh one
    fn retry_or_fail(&mut self, error: StoreError) -> Result<()> {
        let obsolete = self.input.as_ref().is_some_and(|i| i.is_obsolete());
        if !(error.is_corruption() && obsolete) {
            self.close();
            return Err(error);
        }
        warn!(
            path = self.file.path(),
            position = self.position,
            error = %error,
            "Corruption on an obsolete stream, reopening"
        );
        self.close();
        Ok(())
    }

    fn eof(&self, wanted: usize) -> StoreError {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "read of {} bytes past end of {} at {}",
                wanted,
                self.file.path(),
                self.position
            ),
        ))
    }
}
