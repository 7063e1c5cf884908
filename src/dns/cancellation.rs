//! Cooperative cancellation, threaded through every public operation per
//! the "every operation accepts a cancellation context" contract (§4.1,
//! §5). Grounded on the donor's `shutdown.rs::ShutdownCoordinator`,
//! narrowed from its connection-draining/broadcast machinery to the one
//! thing the synchronous Record Store and Resolution Backend need: a
//! cheap, non-blocking "has cancellation been requested" check at each
//! suspension point (a lock acquisition, an upstream round trip, a
//! wildcard-pattern probe, a watch-channel poll).
//!
//! `tokio::sync::watch` replaces the donor's `broadcast` channel: checking
//! a `watch::Receiver` reads the latest published value without consuming
//! anything, which suits a value that is read far more often than it
//! changes (it changes exactly once, at shutdown).

use derive_more::{Display, Error};
use tokio::sync::watch;

/// Returned by an operation that observed cancellation before completing.
#[derive(Debug, Display, Error, PartialEq, Eq, Clone, Copy)]
pub struct Cancelled;

/// A cheap, clonable handle an operation checks at its suspension points.
#[derive(Clone)]
pub struct CancellationContext {
    rx: watch::Receiver<bool>,
}

impl CancellationContext {
    /// A context that never cancels, for callers with no shutdown signal to
    /// thread through (tests, one-shot embeddings of this crate).
    pub fn none() -> CancellationContext {
        let (_tx, rx) = watch::channel(false);
        CancellationContext { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Owned by whoever coordinates shutdown (the out-of-scope process entry
/// point); `cancel()` is observed by every `CancellationContext` handed out
/// by `context()`.
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

impl CancellationHandle {
    pub fn new() -> CancellationHandle {
        let (tx, _rx) = watch::channel(false);
        CancellationHandle { tx }
    }

    pub fn context(&self) -> CancellationContext {
        CancellationContext {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_cancels() {
        assert!(!CancellationContext::none().is_cancelled());
    }

    #[test]
    fn test_cancel_propagates_to_every_context() {
        let handle = CancellationHandle::new();
        let ctx_a = handle.context();
        let ctx_b = handle.context();
        assert!(ctx_a.check().is_ok());

        handle.cancel();

        assert_eq!(ctx_a.check(), Err(Cancelled));
        assert_eq!(ctx_b.check(), Err(Cancelled));
    }

    #[test]
    fn test_context_taken_before_cancel_still_observes_it() {
        let handle = CancellationHandle::new();
        let ctx = handle.context();
        handle.cancel();
        assert!(ctx.is_cancelled());
    }
}
