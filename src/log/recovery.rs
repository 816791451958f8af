//! Log Recovery
//!
//! Result of scanning the tail segment when a log is opened.

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of segments discovered on open
    pub segments_found: usize,

    /// Number of records in the tail segment that decoded cleanly
    pub records_verified: u64,

    /// Bytes cut from the end of the tail segment (torn or corrupt suffix)
    pub truncated_bytes: u64,

    /// High address after recovery
    pub high_address: u64,
}

impl RecoveryResult {
    /// Whether the tail segment was truncated (partial writes removed)
    pub fn was_truncated(&self) -> bool {
        self.truncated_bytes > 0
    }
}
