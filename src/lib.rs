//! # logvfs
//!
//! An append-only log storage engine with a cluster-addressed virtual file
//! system on top:
//! - Fixed-size segments, records never split across a segment boundary
//! - Page-granular read cache, CRC32-checked records
//! - Ordered indexes persisted in the log
//! - Files stored as clusters under `(descriptor, cluster number)` keys
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          VirtualFileSystem / RandomAccessInput               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ ClusterIterator (seek / next / delete)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 OrderedIndex + Cursor                        │
//! │              (paths index, contents index)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ append / read by address
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                          Log                                 │
//! │             (tail writer + page cache, one mutex)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ DataReader  │          │ DataWriter  │
//!   │  (pages)    │          │  (append)   │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod io;
pub mod log;
pub mod index;
pub mod vfs;
pub mod backup;
pub mod environment;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{Config, LogConfig, SyncStrategy, VfsConfig};
pub use environment::Environment;
pub use log::{Log, Loggable, NO_STRUCTURE_ID};
pub use vfs::{ClusterIterator, ClusteringStrategy, VirtualFileSystem};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of logvfs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
