//! Clustering strategies
//!
//! A strategy maps cluster numbers to sizes and logical offsets. It is pure
//! arithmetic over configured constants; the growing progression is part of
//! the persisted format, so it must never change for existing data.
//!
//! ```text
//! Linear(S):           |  S  |  S  |  S  |  S  | ...
//! Growing(f, max):     | f | 4f |   9f   |  max  |  max  | ...
//!                      size(i) = min(f * (i + 1)^2, max)
//! ```

use crate::error::{Result, StoreError};

/// Default cluster size (64 KiB)
pub const DEFAULT_CLUSTER_SIZE: u64 = 64 * 1024;

/// How a virtual file's bytes are cut into clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusteringStrategy {
    /// Every cluster holds exactly `cluster_size` bytes
    Linear { cluster_size: u64 },

    /// Cluster sizes grow quadratically from `first_cluster_size` until they
    /// reach `max_cluster_size`
    Growing {
        first_cluster_size: u64,
        max_cluster_size: u64,
    },
}

impl Default for ClusteringStrategy {
    fn default() -> Self {
        ClusteringStrategy::Linear {
            cluster_size: DEFAULT_CLUSTER_SIZE,
        }
    }
}

impl ClusteringStrategy {
    pub fn linear(cluster_size: u64) -> Self {
        ClusteringStrategy::Linear { cluster_size }
    }

    pub fn growing(first_cluster_size: u64, max_cluster_size: u64) -> Self {
        ClusteringStrategy::Growing {
            first_cluster_size,
            max_cluster_size,
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self, ClusteringStrategy::Linear { .. })
    }

    pub fn first_cluster_size(&self) -> u64 {
        match *self {
            ClusteringStrategy::Linear { cluster_size } => cluster_size,
            ClusteringStrategy::Growing {
                first_cluster_size, ..
            } => first_cluster_size,
        }
    }

    /// Largest cluster size; equal to the first size for a linear strategy
    pub fn max_cluster_size(&self) -> u64 {
        match *self {
            ClusteringStrategy::Linear { cluster_size } => cluster_size,
            ClusteringStrategy::Growing {
                max_cluster_size, ..
            } => max_cluster_size,
        }
    }

    /// Reject sizes that would make addressing loop forever or go backwards
    pub fn validate(&self) -> Result<()> {
        match *self {
            ClusteringStrategy::Linear { cluster_size } => {
                if cluster_size == 0 {
                    return Err(StoreError::Config(
                        "cluster_size must be positive".to_string(),
                    ));
                }
            }
            ClusteringStrategy::Growing {
                first_cluster_size,
                max_cluster_size,
            } => {
                if first_cluster_size == 0 {
                    return Err(StoreError::Config(
                        "first_cluster_size must be positive".to_string(),
                    ));
                }
                if max_cluster_size < first_cluster_size {
                    return Err(StoreError::Config(format!(
                        "max_cluster_size ({}) is smaller than first_cluster_size ({})",
                        max_cluster_size, first_cluster_size
                    )));
                }
            }
        }
        Ok(())
    }

    /// Size of cluster `cluster_number`
    pub fn cluster_size(&self, cluster_number: u64) -> u64 {
        match *self {
            ClusteringStrategy::Linear { cluster_size } => cluster_size,
            ClusteringStrategy::Growing {
                first_cluster_size,
                max_cluster_size,
            } => {
                let k = cluster_number.saturating_add(1);
                first_cluster_size
                    .saturating_mul(k.saturating_mul(k))
                    .min(max_cluster_size)
            }
        }
    }

    /// Logical offset at which cluster `cluster_number` begins
    pub fn starting_position(&self, cluster_number: u64) -> u64 {
        match *self {
            ClusteringStrategy::Linear { cluster_size } => {
                cluster_number.saturating_mul(cluster_size)
            }
            ClusteringStrategy::Growing {
                max_cluster_size, ..
            } => {
                let mut start = 0u64;
                let mut number = 0u64;
                while number < cluster_number {
                    let size = self.cluster_size(number);
                    if size >= max_cluster_size {
                        let rest = (cluster_number - number).saturating_mul(max_cluster_size);
                        return start.saturating_add(rest);
                    }
                    start += size;
                    number += 1;
                }
                start
            }
        }
    }

    /// Cluster holding `position`, as `(cluster_number, starting_position)`
    pub fn locate(&self, position: u64) -> (u64, u64) {
        match *self {
            ClusteringStrategy::Linear { cluster_size } => {
                let number = position / cluster_size;
                (number, number * cluster_size)
            }
            ClusteringStrategy::Growing {
                max_cluster_size, ..
            } => {
                let mut start = 0u64;
                let mut number = 0u64;
                loop {
                    let size = self.cluster_size(number);
                    if size >= max_cluster_size {
                        let skipped = (position - start) / max_cluster_size;
                        return (number + skipped, start + skipped * max_cluster_size);
                    }
                    if position < start + size {
                        return (number, start);
                    }
                    start += size;
                    number += 1;
                }
            }
        }
    }
}
