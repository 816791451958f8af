//! Cluster iterator
//!
//! Forward traversal over one file's clusters through a cursor into the
//! contents index. Starting positions are re-derived from the clustering
//! strategy while walking; nothing about offsets is stored.
//!
//! ## Seek
//! ```text
//! Linear:   key(fd, pos / S) ──range seek──► cluster, start = number * S
//! Growing:  key(fd, 0) ──► c0 ──► c1 ──► ... until start + size(i) > pos
//! ```
//! A key with a different descriptor (or no key at all) ends the file.

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::index::Cursor;

use super::cancel::CancellingPolicyProvider;
use super::cluster::{Cluster, ClusterConverter, ClusterKey};
use super::clustering::ClusteringStrategy;

/// Process-wide settings shared by every iterator of a file system
#[derive(Clone, Default)]
pub struct ClusterSettings {
    pub strategy: ClusteringStrategy,
    pub converter: Option<Arc<dyn ClusterConverter>>,
    pub cancelling: Option<Arc<dyn CancellingPolicyProvider>>,
}

impl ClusterSettings {
    pub fn new(strategy: ClusteringStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn ClusterConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_cancelling(mut self, provider: Arc<dyn CancellingPolicyProvider>) -> Self {
        self.cancelling = Some(provider);
        self
    }

    pub(crate) fn converter(&self) -> Option<&dyn ClusterConverter> {
        self.converter.as_deref()
    }
}

impl fmt::Debug for ClusterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSettings")
            .field("strategy", &self.strategy)
            .field("converter", &self.converter.is_some())
            .field("cancelling", &self.cancelling.is_some())
            .finish()
    }
}

/// Iterator over the clusters of a single file.
///
/// Owned by one traversal; not meant to be shared between threads.
pub struct ClusterIterator<'a> {
    settings: &'a ClusterSettings,
    descriptor: u64,
    cursor: Box<dyn Cursor + 'a>,
    current: Option<Cluster>,
    closed: bool,
}

impl<'a> ClusterIterator<'a> {
    /// Open an iterator positioned at the cluster holding `position`
    pub fn new(
        settings: &'a ClusterSettings,
        cursor: Box<dyn Cursor + 'a>,
        descriptor: u64,
        position: u64,
    ) -> Result<Self> {
        let mut iterator = Self {
            settings,
            descriptor,
            cursor,
            current: None,
            closed: false,
        };
        iterator.seek(position)?;
        Ok(iterator)
    }

    pub fn descriptor(&self) -> u64 {
        self.descriptor
    }

    /// Position on the cluster holding `position`; none past end of file
    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.check_open()?;
        let strategy = self.settings.strategy;

        match strategy {
            ClusteringStrategy::Linear { cluster_size } => {
                let number = position / cluster_size;
                self.current = self.seek_key(number)?;
                if let Some(cluster) = self.current.as_mut() {
                    cluster.set_starting_position(cluster.number().saturating_mul(cluster_size));
                }
            }
            ClusteringStrategy::Growing {
                max_cluster_size, ..
            } => {
                self.current = self.seek_key(0)?;
                let mut start = 0u64;
                let mut size = 0u64;
                loop {
                    let Some(cluster) = self.current.as_mut() else {
                        break;
                    };
                    if size < max_cluster_size {
                        size = strategy.cluster_size(cluster.number());
                    }
                    cluster.set_starting_position(start);
                    if position < start.saturating_add(size) {
                        break;
                    }
                    start = start.saturating_add(size);
                    self.move_to_next()?;
                }
            }
        }

        // Past the data of a partially filled last cluster
        if let Some(cluster) = &self.current {
            if position >= cluster.end_position() {
                self.current = None;
            }
        }
        Ok(())
    }

    pub fn has_cluster(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Result<&Cluster> {
        self.current.as_ref().ok_or(StoreError::NoCurrentCluster)
    }

    /// Advance to the next cluster of this file. No-op once exhausted.
    pub fn move_to_next(&mut self) -> Result<()> {
        self.check_open()?;
        let Some(previous) = self.current.take() else {
            return Ok(());
        };
        if !self.cursor.next()? {
            return Ok(());
        }

        self.current = self.load_current()?;
        if let Some(cluster) = self.current.as_mut() {
            let size = self.settings.strategy.cluster_size(previous.number());
            cluster.set_starting_position(previous.starting_position().saturating_add(size));
        }
        Ok(())
    }

    /// Delete the current cluster's index entry without moving. No-op once
    /// exhausted.
    pub fn delete_current(&mut self) -> Result<()> {
        self.check_open()?;
        if self.current.is_some() {
            self.cursor.delete_current()?;
        }
        Ok(())
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.cursor.close();
            self.current = None;
            self.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::IteratorClosed);
        }
        Ok(())
    }

    fn seek_key(&mut self, cluster_number: u64) -> Result<Option<Cluster>> {
        let key = ClusterKey::new(self.descriptor, cluster_number).encode();
        if !self.cursor.seek_key_or_greater(&key)? {
            return Ok(None);
        }
        self.load_current()
    }

    /// Decode the entry under the cursor, checking for cancellation first
    fn load_current(&self) -> Result<Option<Cluster>> {
        let Some(key) = self.cursor.key() else {
            return Ok(None);
        };
        let key = ClusterKey::decode(key)?;
        if key.descriptor != self.descriptor {
            return Ok(None);
        }

        if let Some(provider) = &self.settings.cancelling {
            let policy = provider.policy();
            if policy.need_to_cancel() {
                return Err(policy.do_cancel());
            }
        }

        let value = self.cursor.value().ok_or_else(|| {
            StoreError::corrupted(format!(
                "cluster {} of file {} has no value",
                key.cluster_number, key.descriptor
            ))
        })?;
        Cluster::decode(key.cluster_number, value, self.settings.converter()).map(Some)
    }
}

impl Drop for ClusterIterator<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
