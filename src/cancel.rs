//! Cooperative cancellation for long-running commands (§5).
//!
//! A `CancelToken` is a cheap `Arc<AtomicBool>` handle; callers check it
//! between groups, between batches, and between per-file digest reads.
//! Tripping it mid-transaction routes through the same rollback path as a
//! failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `Err(Error::Cancelled)` if the token has been tripped.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::cancelled(operation))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check("scan").is_ok());
    }

    #[test]
    fn cancel_trips_the_token() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check("scan"), Err(Error::Cancelled(_))));
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
