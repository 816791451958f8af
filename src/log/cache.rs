//! Page cache
//!
//! LRU cache of fixed-size log pages keyed by page start address. Segments
//! are write-once, so a cached full page never goes stale; partially written
//! tail pages are never inserted.

use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;

/// Hit/miss counters of the page cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub pages: usize,
}

pub(crate) struct PageCache {
    pages: LruCache<u64, Bytes>,
    hits: u64,
    misses: u64,
}

impl PageCache {
    /// A cache of at most `capacity` pages (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            pages: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, address: u64) -> Option<Bytes> {
        match self.pages.get(&address) {
            Some(page) => {
                self.hits += 1;
                Some(page.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, address: u64, data: Bytes) {
        self.pages.put(address, data);
    }

    /// Drop every page in `[start, end)`
    pub fn remove_range(&mut self, start: u64, end: u64) {
        let doomed: Vec<u64> = self
            .pages
            .iter()
            .map(|(&address, _)| address)
            .filter(|&a| a >= start && a < end)
            .collect();
        for address in doomed {
            self.pages.pop(&address);
        }
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            pages: self.pages.len(),
        }
    }
}
