//! Cancellation handle carried by every [`Context`](crate::Context).
//!
//! A closed-latch built from an atomic flag plus a broadcast channel, the
//! same shape the server uses for graceful shutdown. The dispatch engine
//! never polls it; providers and methods are expected to honor it on their
//! own blocking operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// A cloneable cancellation latch with an optional deadline.
///
/// All clones observe the same latch: cancelling one cancels them all.
///
/// # Example
///
/// ```
/// use hermes_core::Cancellation;
///
/// let cancel = Cancellation::new();
/// let observer = cancel.clone();
/// assert!(!observer.is_cancelled());
///
/// cancel.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    sender: broadcast::Sender<()>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// Creates a new, uncancelled handle with no deadline.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            sender,
            deadline: None,
        }
    }

    /// Returns a copy of this handle with the given deadline attached.
    ///
    /// The deadline is advisory: it is surfaced via [`deadline`](Self::deadline)
    /// but nothing fires automatically when it passes.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancels the latch. Idempotent.
    pub fn cancel(&self) {
        if self
            .flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // No receivers is fine.
            let _ = self.sender.send(());
        }
    }

    /// Returns `true` once the latch has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns the deadline, if one was attached.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Completes when the latch is cancelled. Completes immediately if it
    /// already was.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let mut receiver = self.sender.subscribe();
        // Re-check after subscribing: cancel() may have raced the subscribe.
        if self.is_cancelled() {
            return;
        }
        let _ = receiver.recv().await;
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
