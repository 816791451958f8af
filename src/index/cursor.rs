//! Cursor over a sorted map
//!
//! Both shipped indexes keep a `BTreeMap` of keys; the cursor remembers the
//! current key and re-seeks past it on `next()`, so deleting the current
//! entry never invalidates the position.

use bytes::Bytes;

use crate::error::{Result, StoreError};

use super::Cursor;

/// Entry lookups a [`RangeCursor`] needs from its index
pub(super) trait RangeSource {
    /// First entry with key `>= key` (or `> key` when `exclusive`)
    fn entry_from(&self, key: &[u8], exclusive: bool) -> Result<Option<(Vec<u8>, Bytes)>>;

    fn remove(&self, key: &[u8]) -> Result<bool>;
}

pub(super) struct RangeCursor<'a, S: RangeSource> {
    source: &'a S,
    current: Option<(Vec<u8>, Bytes)>,
    closed: bool,
}

impl<'a, S: RangeSource> RangeCursor<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            current: None,
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::CursorClosed);
        }
        Ok(())
    }
}

impl<'a, S: RangeSource> Cursor for RangeCursor<'a, S> {
    fn seek_key_or_greater(&mut self, key: &[u8]) -> Result<bool> {
        self.check_open()?;
        self.current = self.source.entry_from(key, false)?;
        Ok(self.current.is_some())
    }

    fn next(&mut self) -> Result<bool> {
        self.check_open()?;
        let Some((key, _)) = self.current.take() else {
            return Ok(false);
        };
        self.current = self.source.entry_from(&key, true)?;
        Ok(self.current.is_some())
    }

    fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    fn value(&self) -> Option<&Bytes> {
        self.current.as_ref().map(|(_, v)| v)
    }

    fn delete_current(&mut self) -> Result<bool> {
        self.check_open()?;
        match &self.current {
            Some((key, _)) => self.source.remove(key),
            None => Ok(false),
        }
    }

    fn close(&mut self) {
        self.current = None;
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
