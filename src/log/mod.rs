//! Log Module
//!
//! Durable append-only storage of loggables, addressable by absolute offset
//! and read through a page cache.
//!
//! ## Responsibilities
//! - Append typed records to the tail segment, sealing it when full
//! - CRC32 checksums for corruption detection
//! - Page-granular cached reads through the reader collaborator
//! - Tail recovery on open
//!
//! ## Record Format
//! ```text
//! ┌──────────┬──────────┬──────────────┬─────────┬─────────┬─────────┐
//! │ Type (1) │ Flag (1) │ StructId (8) │ Len (4) │ CRC (4) │ Payload │
//! └──────────┴──────────┴──────────────┴─────────┴─────────┴─────────┘
//!                         only when Flag = 1
//! ```
//!
//! ## Segment Sealing
//! ```text
//! segment N:   [rec][rec][rec][0 0 0 ... padding]│
//! segment N+1: [rec that did not fit][rec] ...   │
//! ```

mod cache;
mod iterator;
mod loggable;
mod recovery;
mod store;

pub use cache::CacheStats;
pub use iterator::LoggableIterator;
pub use loggable::{
    Loggable, BASE_HEADER_SIZE, MAX_HEADER_SIZE, MAX_LOGGABLE_TYPE, NO_STRUCTURE_ID, PADDING_TYPE,
};
pub use recovery::RecoveryResult;
pub use store::Log;
