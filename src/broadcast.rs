//! Change broadcaster: signals downstream proxy loaders that the
//! configuration store has new committed state.
//!
//! A bare atomic boolean only works correctly for a single consumer loop —
//! concurrent readers racing a swap-to-false can silently steal each other's
//! edge. This uses a `tokio::sync::watch` channel instead: every subscriber
//! gets its own "have I seen the latest value" cursor via
//! `Receiver::changed`/`borrow_and_update`, so N independent proxy loaders
//! can each observe the edge exactly once without coordinating with each
//! other.

use tokio::sync::watch;

/// Handle held by the Request Processor; raises the edge after each
/// successful batch commit.
pub struct Broadcaster {
    tx: watch::Sender<bool>,
}

/// Handle held by a downstream consumer loop.
pub struct ChangeSubscription {
    rx: watch::Receiver<bool>,
}

/// Construct a linked broadcaster/subscription-factory pair, initially
/// quiescent (no pending change).
pub fn channel() -> (Broadcaster, ChangeSubscription) {
    let (tx, rx) = watch::channel(false);
    (Broadcaster { tx }, ChangeSubscription { rx })
}

impl Broadcaster {
    /// Raise the "configuration changed" edge for every subscriber.
    pub fn broadcast_changes(&self) {
        self.tx.send_replace(true);
    }
}

impl ChangeSubscription {
    /// A fresh, independent cursor over the same edge, for an additional
    /// consumer loop.
    pub fn resubscribe(&self) -> ChangeSubscription {
        ChangeSubscription {
            rx: self.rx.clone(),
        }
    }

    /// Wait for the next edge, consuming it. Returns `false` only if the
    /// broadcaster has been dropped (shutdown).
    pub async fn wait_for_change(&mut self) -> bool {
        if self.rx.changed().await.is_err() {
            return false;
        }
        self.rx.borrow_and_update();
        true
    }

    /// Non-blocking check: true and marks seen if a change is pending.
    pub fn poll_and_take(&mut self) -> bool {
        if *self.rx.borrow() {
            self.rx.borrow_and_update();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_and_take_is_edge_triggered_once_per_subscriber() {
        let (broadcaster, mut sub_a) = channel();
        let mut sub_b = sub_a.resubscribe();

        assert!(!sub_a.poll_and_take());
        broadcaster.broadcast_changes();

        assert!(sub_a.poll_and_take());
        assert!(!sub_a.poll_and_take());

        assert!(sub_b.poll_and_take());
        assert!(!sub_b.poll_and_take());
    }

    #[tokio::test]
    async fn wait_for_change_resolves_after_broadcast() {
        let (broadcaster, mut sub) = channel();
        let waiter = tokio::spawn(async move {
            sub.wait_for_change().await
        });
        broadcaster.broadcast_changes();
        assert!(waiter.await.unwrap());
    }
}
