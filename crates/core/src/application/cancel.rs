// Cooperative Cancellation Pair

use tokio::sync::watch;

/// Cancellation token handed to the executing delegate
///
/// Cancellation is signaled, never forced: a delegate that ignores the
/// token runs to completion and is classified by its own return value.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Check whether cancellation was requested
    pub fn is_canceled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is requested
    pub async fn canceled(&mut self) {
        // Already-signaled tokens resolve immediately
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return; // source dropped, treat as canceled
            }
        }
    }
}

/// Cancellation source, owned by the engine (one per WorkUnit)
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    /// Signal cancellation to the token holder
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a cancellation pair
pub fn cancel_pair() -> (CancelSource, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSource { tx }, CancelToken { rx })
}
