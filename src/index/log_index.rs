//! Log-backed ordered index
//!
//! Every put and delete is appended to the log as a loggable tagged with the
//! index's structure id. Only the key → address map lives in memory; it is
//! rebuilt by replaying the log on open. Values are read back through
//! [`Log::read`], so a damaged record surfaces as `DataCorruption`.
//!
//! ## Payload Format
//! ```text
//! put:    [KeyLen: u32][Key][Value]
//! delete: [Key]
//! ```

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::log::{Log, NO_STRUCTURE_ID};

use super::cursor::{RangeCursor, RangeSource};
use super::{Cursor, OrderedIndex};

/// Loggable type of an index put
pub const INDEX_PUT_TYPE: u8 = 0x10;

/// Loggable type of an index delete
pub const INDEX_DELETE_TYPE: u8 = 0x11;

/// Ordered index persisted in a [`Log`]
pub struct LogIndex {
    log: Arc<Log>,
    structure_id: u64,
    /// key → address of the put record holding the current value
    entries: RwLock<BTreeMap<Vec<u8>, u64>>,
}

impl LogIndex {
    /// Open the index stored under `structure_id`, replaying the log
    pub fn open(log: Arc<Log>, structure_id: u64) -> Result<Self> {
        if structure_id == NO_STRUCTURE_ID {
            return Err(StoreError::InvalidArgument(
                "a log index needs a structure id".to_string(),
            ));
        }

        let mut entries = BTreeMap::new();
        let mut replayed = 0u64;
        for loggable in log.iter(log.first_address()) {
            let loggable = loggable?;
            if loggable.structure_id != structure_id {
                continue;
            }
            match loggable.loggable_type {
                INDEX_PUT_TYPE => {
                    let (key, _) = decode_put(loggable.address, &loggable.payload)?;
                    entries.insert(key.to_vec(), loggable.address);
                }
                INDEX_DELETE_TYPE => {
                    entries.remove(&loggable.payload[..]);
                }
                other => {
                    return Err(StoreError::corruption(
                        loggable.address,
                        format!("unexpected loggable type 0x{other:02x} in index {structure_id}"),
                    ))
                }
            }
            replayed += 1;
        }

        info!(structure_id, replayed, live = entries.len(), "Index opened");
        Ok(Self {
            log,
            structure_id,
            entries: RwLock::new(entries),
        })
    }

    pub fn structure_id(&self) -> u64 {
        self.structure_id
    }

    pub fn log(&self) -> &Arc<Log> {
        &self.log
    }

    /// Address of the record holding the current value of `key`
    pub fn address_of(&self, key: &[u8]) -> Option<u64> {
        self.entries.read().get(key).copied()
    }

    fn read_value(&self, address: u64) -> Result<Bytes> {
        let loggable = self.log.read(address)?;
        if loggable.loggable_type != INDEX_PUT_TYPE || loggable.structure_id != self.structure_id {
            return Err(StoreError::corruption(
                address,
                format!(
                    "expected an index put of structure {}, found type 0x{:02x} of structure {}",
                    self.structure_id, loggable.loggable_type, loggable.structure_id
                ),
            ));
        }
        let (_, value) = decode_put(address, &loggable.payload)?;
        Ok(value)
    }
}

fn encode_put(key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
    let key_len = u32::try_from(key.len())
        .map_err(|_| StoreError::InvalidArgument(format!("key of {} bytes is too long", key.len())))?;
    let mut payload = Vec::with_capacity(4 + key.len() + value.len());
    payload.extend_from_slice(&key_len.to_le_bytes());
    payload.extend_from_slice(key);
    payload.extend_from_slice(value);
    Ok(payload)
}

fn decode_put(address: u64, payload: &Bytes) -> Result<(Bytes, Bytes)> {
    if payload.len() < 4 {
        return Err(StoreError::corruption(address, "index put: missing key length"));
    }
    let key_len = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    if payload.len() < 4 + key_len {
        return Err(StoreError::corruption(
            address,
            format!(
                "index put: incomplete key (expected {}, got {})",
                key_len,
                payload.len() - 4
            ),
        ));
    }
    Ok((payload.slice(4..4 + key_len), payload.slice(4 + key_len..)))
}

impl RangeSource for LogIndex {
    fn entry_from(&self, key: &[u8], exclusive: bool) -> Result<Option<(Vec<u8>, Bytes)>> {
        let lower = if exclusive {
            Bound::Excluded(key)
        } else {
            Bound::Included(key)
        };
        let found = self
            .entries
            .read()
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
            .map(|(k, &address)| (k.clone(), address));

        match found {
            Some((key, address)) => Ok(Some((key, self.read_value(address)?))),
            None => Ok(None),
        }
    }

    fn remove(&self, key: &[u8]) -> Result<bool> {
        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            return Ok(false);
        }
        self.log.append(INDEX_DELETE_TYPE, self.structure_id, key)?;
        entries.remove(key);
        debug!(structure_id = self.structure_id, "Index entry deleted");
        Ok(true)
    }
}

impl OrderedIndex for LogIndex {
    fn open_cursor(&self) -> Result<Box<dyn Cursor + '_>> {
        Ok(Box::new(RangeCursor::new(self)))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        match self.address_of(key) {
            Some(address) => Ok(Some(self.read_value(address)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let payload = encode_put(key, value)?;
        // Hold the map lock across the append so map order matches log order
        let mut entries = self.entries.write();
        let address = self.log.append(INDEX_PUT_TYPE, self.structure_id, &payload)?;
        entries.insert(key.to_vec(), address);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        RangeSource::remove(self, key)
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
