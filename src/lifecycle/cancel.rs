//! Cancellation signalling for background tasks.
//!
//! Built on a `tokio::sync::watch` channel so that a handle created *after*
//! the signal fired still observes the cancellation. Retry loops depend on
//! this: a watcher stopped between the error event and the loop's first
//! backoff must not re-subscribe.

use tokio::sync::watch;

/// Owning side of a cancellation signal.
#[derive(Debug)]
pub struct Cancellation {
    tx: watch::Sender<bool>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Raise the signal. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Create a handle that tasks can await on.
    pub fn handle(&self) -> CancelHandle {
        CancelHandle {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// Awaitable view of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    /// Resolve once the signal is raised. Resolves immediately if it already
    /// was, or if the owning `Cancellation` has been dropped.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}
