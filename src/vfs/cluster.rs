//! Cluster and cluster key codec
//!
//! ## Cluster Key Format
//! ```text
//! ┌────────────────────┬────────────────────┐
//! │ Descriptor (u64 BE)│ Cluster No. (u64 BE)│
//! └────────────────────┴────────────────────┘
//! ```
//! Big-endian fields make byte order equal numeric order, so every cluster
//! of a file sorts before the clusters of the next descriptor.
//!
//! A cluster value is the file's raw bytes, passed through the installed
//! [`ClusterConverter`] if there is one.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, StoreError};

/// Encoded size of a [`ClusterKey`]
pub const CLUSTER_KEY_SIZE: usize = 16;

/// Index key of one cluster of one virtual file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterKey {
    pub descriptor: u64,
    pub cluster_number: u64,
}

impl ClusterKey {
    pub fn new(descriptor: u64, cluster_number: u64) -> Self {
        Self {
            descriptor,
            cluster_number,
        }
    }

    pub fn encode(&self) -> [u8; CLUSTER_KEY_SIZE] {
        let mut key = [0u8; CLUSTER_KEY_SIZE];
        key[..8].copy_from_slice(&self.descriptor.to_be_bytes());
        key[8..].copy_from_slice(&self.cluster_number.to_be_bytes());
        key
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let key: &[u8; CLUSTER_KEY_SIZE] = bytes.try_into().map_err(|_| {
            StoreError::corrupted(format!(
                "cluster key must be {} bytes, got {}",
                CLUSTER_KEY_SIZE,
                bytes.len()
            ))
        })?;

        let mut descriptor = [0u8; 8];
        let mut cluster_number = [0u8; 8];
        descriptor.copy_from_slice(&key[..8]);
        cluster_number.copy_from_slice(&key[8..]);
        Ok(Self {
            descriptor: u64::from_be_bytes(descriptor),
            cluster_number: u64::from_be_bytes(cluster_number),
        })
    }
}

/// Transform applied to cluster bytes on their way into and out of the index.
///
/// Must be total and invertible: `on_read(on_write(x)) == x`.
pub trait ClusterConverter: Send + Sync {
    fn on_write(&self, raw: &[u8]) -> Bytes;

    fn on_read(&self, stored: &[u8]) -> Result<Bytes>;
}

/// Appends a CRC32 to every cluster and verifies it on read
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumConverter;

impl ClusterConverter for ChecksumConverter {
    fn on_write(&self, raw: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(raw.len() + 4);
        out.put_slice(raw);
        out.put_u32_le(crc32fast::hash(raw));
        out.freeze()
    }

    fn on_read(&self, stored: &[u8]) -> Result<Bytes> {
        if stored.len() < 4 {
            return Err(StoreError::corrupted(format!(
                "checksummed cluster of {} bytes is too short",
                stored.len()
            )));
        }
        let (raw, checksum) = stored.split_at(stored.len() - 4);
        let expected = u32::from_le_bytes([checksum[0], checksum[1], checksum[2], checksum[3]]);
        let actual = crc32fast::hash(raw);
        if expected != actual {
            return Err(StoreError::corrupted(format!(
                "cluster checksum mismatch (expected {:08x}, got {:08x})",
                expected, actual
            )));
        }
        Ok(Bytes::copy_from_slice(raw))
    }
}

/// One chunk of a virtual file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    number: u64,
    /// Derived while traversing; never stored
    starting_position: u64,
    data: Bytes,
}

impl Cluster {
    pub fn new(number: u64, starting_position: u64, data: Bytes) -> Self {
        Self {
            number,
            starting_position,
            data,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn starting_position(&self) -> u64 {
        self.starting_position
    }

    pub(crate) fn set_starting_position(&mut self, position: u64) {
        self.starting_position = position;
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Logical offset one past the cluster's last byte
    pub fn end_position(&self) -> u64 {
        self.starting_position + self.data.len() as u64
    }

    /// Encode raw file bytes into the stored cluster value
    pub fn encode(raw: &[u8], converter: Option<&dyn ClusterConverter>) -> Bytes {
        match converter {
            Some(converter) => converter.on_write(raw),
            None => Bytes::copy_from_slice(raw),
        }
    }

    /// Decode a stored cluster value. The starting position is left at zero
    /// for the caller to derive.
    pub fn decode(
        number: u64,
        stored: &Bytes,
        converter: Option<&dyn ClusterConverter>,
    ) -> Result<Self> {
        let data = match converter {
            Some(converter) => converter.on_read(stored)?,
            None => stored.clone(),
        };
        Ok(Self::new(number, 0, data))
    }
}
