//! Change notifier
//!
//! Fans committed topology events out to subscribers. Each subscriber owns
//! an unbounded channel, so a slow consumer never loses events and never
//! blocks a commit. Sequence numbers are assigned here, in the order the
//! store publishes, which is the store's commit order.

use std::sync::atomic::{AtomicU64, Ordering};

use hostmap_core::{DiscoveryEvent, SequencedEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

/// Distributes committed events to subscribers
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SequencedEvent>>>,
    last_sequence: AtomicU64,
}

impl ChangeNotifier {
    /// Create a notifier with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber
    ///
    /// The stream receives every event published after this call.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        EventStream { rx }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Sequence number of the most recently published event (0 if none)
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::SeqCst)
    }

    /// Publish a batch of committed events in order
    ///
    /// Called by the store while it still holds its commit lock.
    pub(crate) fn publish(&self, events: Vec<DiscoveryEvent>) {
        if events.is_empty() {
            return;
        }

        let mut subscribers = self.subscribers.lock();
        for event in events {
            let sequence = self.last_sequence.fetch_add(1, Ordering::SeqCst) + 1;
            trace!(sequence, kind = event.kind(), "Publishing topology event");
            let sequenced = SequencedEvent { sequence, event };
            subscribers.retain(|tx| tx.send(sequenced.clone()).is_ok());
        }
    }
}

/// Receiving end of a subscription
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SequencedEvent>,
}

impl EventStream {
    /// Wait for the next event
    ///
    /// Returns `None` once the notifier has been dropped and every
    /// buffered event has been delivered.
    pub async fn recv(&mut self) -> Option<SequencedEvent> {
        self.rx.recv().await
    }

    /// Take the next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<SequencedEvent> {
        self.rx.try_recv().ok()
    }

    /// Take every buffered event
    pub fn drain(&mut self) -> Vec<SequencedEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
