//! Loggable definitions
//!
//! A loggable is one typed record in the log, identified by the address of
//! its first byte.

use bytes::Bytes;

use crate::error::{Result, StoreError};

/// Structure id of records not tied to any higher-level structure
pub const NO_STRUCTURE_ID: u64 = 0;

/// Type byte of segment padding; never a valid record type
pub const PADDING_TYPE: u8 = 0;

/// Largest valid record type
pub const MAX_LOGGABLE_TYPE: u8 = 0x7F;

/// Header size without structure id:
/// Type (1) + HasStructure (1) + PayloadLen (4) + CRC (4) = 10 bytes
pub const BASE_HEADER_SIZE: usize = 10;

/// Header size with structure id: BASE_HEADER_SIZE + StructureId (8) = 18 bytes
pub const MAX_HEADER_SIZE: usize = BASE_HEADER_SIZE + 8;

/// A record read back from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loggable {
    /// Absolute log offset of the record's first byte
    pub address: u64,

    /// Record type, in `1..=MAX_LOGGABLE_TYPE`
    pub loggable_type: u8,

    /// Owning structure, or [`NO_STRUCTURE_ID`]
    pub structure_id: u64,

    pub payload: Bytes,
}

impl Loggable {
    /// Header size for a record with the given structure id
    pub fn header_size(structure_id: u64) -> usize {
        if structure_id == NO_STRUCTURE_ID {
            BASE_HEADER_SIZE
        } else {
            MAX_HEADER_SIZE
        }
    }

    /// Total on-log size of a record
    pub fn encoded_len(structure_id: u64, payload_len: usize) -> u64 {
        (Self::header_size(structure_id) + payload_len) as u64
    }

    /// Serialize a record
    ///
    /// Format:
    /// `[type:1][has_structure:1][structure_id:8]?[payload_len:4][crc:4][payload]`
    pub fn encode(loggable_type: u8, structure_id: u64, payload: &[u8]) -> Result<Vec<u8>> {
        if loggable_type == PADDING_TYPE || loggable_type > MAX_LOGGABLE_TYPE {
            return Err(StoreError::InvalidArgument(format!(
                "loggable type {loggable_type} outside 1..={MAX_LOGGABLE_TYPE}"
            )));
        }
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            StoreError::InvalidArgument(format!("payload of {} bytes is too long", payload.len()))
        })?;

        let mut bytes = Vec::with_capacity(Self::encoded_len(structure_id, payload.len()) as usize);
        bytes.push(loggable_type);
        if structure_id == NO_STRUCTURE_ID {
            bytes.push(0);
        } else {
            bytes.push(1);
            bytes.extend_from_slice(&structure_id.to_le_bytes());
        }
        bytes.extend_from_slice(&payload_len.to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
        bytes.extend_from_slice(payload);
        Ok(bytes)
    }

    /// On-log size of this record
    pub fn len(&self) -> u64 {
        Self::encoded_len(self.structure_id, self.payload.len())
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Address right after this record
    pub fn end_address(&self) -> u64 {
        self.address + self.len()
    }

    pub fn has_structure(&self) -> bool {
        self.structure_id != NO_STRUCTURE_ID
    }
}

/// Decoded record header
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordHeader {
    pub loggable_type: u8,
    pub structure_id: u64,
    pub payload_len: u32,
    pub crc: u32,
    pub header_len: usize,
}

impl RecordHeader {
    /// Parse a header from the bytes available at `address`.
    ///
    /// `bytes` may be shorter than [`MAX_HEADER_SIZE`] near a segment end.
    pub fn decode(address: u64, bytes: &[u8]) -> Result<Self> {
        let loggable_type = *bytes
            .first()
            .ok_or_else(|| StoreError::corruption(address, "empty record header"))?;
        if loggable_type == PADDING_TYPE || loggable_type > MAX_LOGGABLE_TYPE {
            return Err(StoreError::corruption(
                address,
                format!("unknown loggable type 0x{loggable_type:02x}"),
            ));
        }

        let header_len = match bytes.get(1) {
            Some(0) => BASE_HEADER_SIZE,
            Some(1) => MAX_HEADER_SIZE,
            Some(flag) => {
                return Err(StoreError::corruption(
                    address,
                    format!("invalid structure flag 0x{flag:02x}"),
                ))
            }
            None => return Err(StoreError::corruption(address, "truncated record header")),
        };
        if bytes.len() < header_len {
            return Err(StoreError::corruption(
                address,
                format!("truncated record header: {} of {} bytes", bytes.len(), header_len),
            ));
        }

        let mut pos = 2;
        let structure_id = if header_len == MAX_HEADER_SIZE {
            let id = read_u64(&bytes[pos..pos + 8]);
            pos += 8;
            if id == NO_STRUCTURE_ID {
                return Err(StoreError::corruption(
                    address,
                    "structure flag set without a structure id",
                ));
            }
            id
        } else {
            NO_STRUCTURE_ID
        };
        let payload_len = read_u32(&bytes[pos..pos + 4]);
        let crc = read_u32(&bytes[pos + 4..pos + 8]);

        Ok(Self {
            loggable_type,
            structure_id,
            payload_len,
            crc,
            header_len,
        })
    }

    pub fn total_len(&self) -> u64 {
        self.header_len as u64 + self.payload_len as u64
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
