// Lifecycle Notifier - ordered event fan-out to subscribers

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::CommandEvent;

/// Subscription identifier, unique per command
pub type SubscriptionId = u64;

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<CommandEvent>,
}

/// Subscriber registry
///
/// Lives inside the engine's exclusion domain, so `emit` is serialized
/// with state transitions: subscribers observe events in exactly the
/// order the transitions happened. Delivery is a non-blocking send into
/// an unbounded channel - a slow observer delays only itself, never the
/// dispatcher.
pub struct LifecycleNotifier {
    subscribers: Vec<Subscriber>,
    next_id: SubscriptionId,
}

impl LifecycleNotifier {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 1,
        }
    }

    pub fn subscribe(&mut self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push(Subscriber { id, tx });
        debug!(subscription = id, "Subscriber attached");
        EventStream { id, rx }
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|s| s.id != id);
    }

    /// Fan out one event; prunes subscribers whose stream was dropped
    pub fn emit(&mut self, event: CommandEvent) {
        self.subscribers.retain(|s| s.tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for LifecycleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a subscription
///
/// Dropping the stream detaches it (the registry prunes the stale sender
/// on the next emission); `Command::unsubscribe` removes it immediately.
pub struct EventStream {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<CommandEvent>,
}

impl EventStream {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receive the next event; `None` once the command is dropped
    pub async fn recv(&mut self) -> Option<CommandEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<CommandEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = CommandEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
