//! In-memory ordered index

use std::collections::BTreeMap;
use std::ops::Bound;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::Result;

use super::cursor::{RangeCursor, RangeSource};
use super::{Cursor, OrderedIndex};

/// `BTreeMap`-backed [`OrderedIndex`]; nothing survives the process
#[derive(Default)]
pub struct MemoryIndex {
    entries: RwLock<BTreeMap<Vec<u8>, Bytes>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RangeSource for MemoryIndex {
    fn entry_from(&self, key: &[u8], exclusive: bool) -> Result<Option<(Vec<u8>, Bytes)>> {
        let lower = if exclusive {
            Bound::Excluded(key)
        } else {
            Bound::Included(key)
        };
        Ok(self
            .entries
            .read()
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone())))
    }

    fn remove(&self, key: &[u8]) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }
}

impl OrderedIndex for MemoryIndex {
    fn open_cursor(&self) -> Result<Box<dyn Cursor + '_>> {
        Ok(Box::new(RangeCursor::new(self)))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_vec(), Bytes::copy_from_slice(value));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        RangeSource::remove(self, key)
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
