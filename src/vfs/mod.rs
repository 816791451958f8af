//! Virtual File System Module
//!
//! Cluster-addressed files on top of an ordered index.
//!
//! ## Components
//! - `ClusteringStrategy`: cluster sizes and offsets
//! - `ClusterKey` / `Cluster`: index key and value codec, optional converter
//! - `ClusterIterator`: forward traversal with cooperative cancellation
//! - `VirtualFileSystem`: files, writes, truncation
//! - `VfsInputStream` / `RandomAccessInput`: readers
//!
//! ## Layout
//! ```text
//! file "a" (fd 3), Linear(S)
//!   position:  0        S        2S      2S+k
//!              ├────────┼────────┼───────┤
//!   key:       (3,0)    (3,1)    (3,2)
//! ```

mod cancel;
mod cluster;
mod clustering;
mod fs;
mod input;
mod iterator;
mod stream;

pub use cancel::{CancellationToken, CancellingPolicy, CancellingPolicyProvider, DeadlinePolicy};
pub use cluster::{ChecksumConverter, Cluster, ClusterConverter, ClusterKey, CLUSTER_KEY_SIZE};
pub use clustering::{ClusteringStrategy, DEFAULT_CLUSTER_SIZE};
pub use fs::{File, VirtualFileSystem};
pub use input::RandomAccessInput;
pub use iterator::{ClusterIterator, ClusterSettings};
pub use stream::VfsInputStream;
