//! Cooperative cancellation
//!
//! Policies are consulted by [`ClusterIterator`](super::ClusterIterator) on
//! every cluster transition. What cancelling means is up to the policy; the
//! iterator only returns the error the policy builds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::StoreError;

pub trait CancellingPolicy: Send + Sync {
    fn need_to_cancel(&self) -> bool;

    /// Error returned from the interrupted operation
    fn do_cancel(&self) -> StoreError;
}

/// Hands out the policy for the current traversal
pub trait CancellingPolicyProvider: Send + Sync {
    fn policy(&self) -> Arc<dyn CancellingPolicy>;
}

impl<P> CancellingPolicyProvider for P
where
    P: CancellingPolicy + Clone + 'static,
{
    fn policy(&self) -> Arc<dyn CancellingPolicy> {
        Arc::new(self.clone())
    }
}

/// Shared flag; every clone observes `cancel()`
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl CancellingPolicy for CancellationToken {
    fn need_to_cancel(&self) -> bool {
        self.is_cancelled()
    }

    fn do_cancel(&self) -> StoreError {
        StoreError::Cancelled("cancellation requested".to_string())
    }
}

/// Cancels once a fixed instant has passed
#[derive(Debug, Clone, Copy)]
pub struct DeadlinePolicy {
    deadline: Instant,
}

impl DeadlinePolicy {
    pub fn at(deadline: Instant) -> Self {
        Self { deadline }
    }

    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl CancellingPolicy for DeadlinePolicy {
    fn need_to_cancel(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn do_cancel(&self) -> StoreError {
        StoreError::Cancelled("deadline exceeded".to_string())
    }
}
