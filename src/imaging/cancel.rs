//! Cooperative cancellation for a single pipeline invocation.
//!
//! The pipeline only blocks on I/O: reading the source stream and writing
//! to the store. Both loops poll a [`CancelToken`] between chunks, so a
//! cancel or an expired deadline stops the work at the next chunk boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Operation cancelled")]
pub struct Cancelled;

/// Shared cancel flag plus an optional deadline.
///
/// Clones share the flag, so one clone can be handed to another thread to
/// cancel the invocation holding the other.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never fires unless [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also fires once `timeout` has elapsed from now.
    /// A timeout too large to represent as an `Instant` means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_live() {
        assert!(CancelToken::new().check().is_ok());
    }

    #[test]
    fn cancel_is_seen_by_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert_eq!(token.check(), Err(Cancelled));
    }

    #[test]
    fn zero_timeout_fires_immediately() {
        let token = CancelToken::with_timeout(Duration::ZERO);
        assert!(token.is_cancelled());
    }

    #[test]
    fn long_timeout_does_not_fire() {
        let token = CancelToken::with_timeout(Duration::from_secs(3600));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn unrepresentable_timeout_means_no_deadline() {
        let token = CancelToken::with_timeout(Duration::from_secs(i64::MAX as u64));
        assert!(token.check().is_ok());
        assert!(CancelToken::with_timeout(Duration::MAX).check().is_ok());
    }
}
