//! Cooperative cancellation for session background work.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable token that is cancelled once and stays cancelled.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled_tx: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (cancelled_tx, _cancelled_rx) = watch::channel(false);
        Self {
            cancelled_tx: Arc::new(cancelled_tx),
        }
    }

    /// Cancel the token. Returns `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        !self.cancelled_tx.send_replace(true)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled_tx.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut cancelled_rx = self.cancelled_tx.subscribe();
        loop {
            if *cancelled_rx.borrow_and_update() {
                return;
            }
            if cancelled_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_for_every_clone() {
        let token = CancellationToken::new();
        let clone = token.clone();
        let waiter = tokio::spawn(async move { clone.cancelled().await });

        assert!(token.cancel());
        assert!(!token.cancel());
        waiter.await.unwrap();
        assert!(token.is_cancelled());

        // Already cancelled tokens resolve immediately.
        token.cancelled().await;
    }
}
