//! Loggable Iterator
//!
//! Sequential iteration over records, in address order.

use crate::error::Result;

use super::loggable::Loggable;
use super::store::Log;

/// Iterator over log records starting at a given address
///
/// Segment padding is skipped by jumping to the next segment. The first
/// error ends the iteration.
pub struct LoggableIterator<'a> {
    log: &'a Log,
    next_address: u64,
    done: bool,
}

impl<'a> LoggableIterator<'a> {
    pub(super) fn new(log: &'a Log, address: u64) -> Self {
        Self {
            log,
            next_address: address,
            done: false,
        }
    }

    /// Address the next call to `next()` will read from
    pub fn next_address(&self) -> u64 {
        self.next_address
    }
}

impl<'a> Iterator for LoggableIterator<'a> {
    type Item = Result<Loggable>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut state = match self.log.lock() {
            Ok(state) => state,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        loop {
            if self.next_address >= state.high_address() {
                self.done = true;
                return None;
            }

            // Skip over reclaimed segments
            let segment = self.log.segment_start(self.next_address);
            match state.live_segment_from(segment) {
                Some(live) if live != segment => {
                    self.next_address = live;
                    continue;
                }
                Some(_) => {}
                None => {
                    self.done = true;
                    return None;
                }
            }

            match self.log.read_at(&mut state, self.next_address) {
                Ok(Some(loggable)) => {
                    self.next_address = loggable.end_address();
                    return Some(Ok(loggable));
                }
                Ok(None) => {
                    self.next_address =
                        self.log.segment_start(self.next_address) + self.log.config().file_size;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
