use tokio::sync::broadcast;

use tandem_types::events::SessionEvent;

const FEED_CAPACITY: usize = 1024;

/// Fan-out of session change events.
///
/// Nothing in the core depends on anyone listening: clients may keep
/// polling, or follow a subscription to refresh only when something moved.
#[derive(Clone)]
pub struct SessionFeed {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        // No subscribers is the normal polling case.
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SessionFeed {
    fn default() -> Self {
        Self::new()
    }
}
