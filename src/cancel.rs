//! Cooperative cancellation token shared across pipeline stages.
//!
//! The orchestrator hands one token down to every stage, worker and the
//! writer. Cancellation is cooperative: holders check the token between
//! locators, between chunks of a large download and between retry sleeps,
//! then unwind leaving the persisted flags consistent. Cancelling is not
//! an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cheap clonable cancellation flag.
///
/// # Example
///
/// ```
/// use dictforge_core::CancelToken;
///
/// let token = CancelToken::new();
/// let worker_token = token.clone();
/// assert!(!worker_token.is_cancelled());
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_starts_clear() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_token_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancel_token_is_idempotent() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }
}
