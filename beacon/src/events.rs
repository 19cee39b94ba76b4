//! Fan-out of discovered records to any number of subscribers.
//!
//! Each subscriber owns an unbounded flume channel. Publishing happens under
//! one lock, so every subscriber sees records in the same order they were
//! decoded. Completing the stream drops all senders: receivers drain what is
//! queued and then observe end-of-stream.

use std::sync::{Arc, Weak};
use parking_lot::Mutex;
use shared::types::ServiceRecord;

/// Identifies one subscription for explicit unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct StreamState {
    subscribers: Vec<(SubscriptionId, flume::Sender<ServiceRecord>)>,
    next_id: u64,
    completed: bool,
}

#[derive(Clone, Default)]
pub struct EventStream {
    state: Arc<Mutex<StreamState>>,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber. Only records published after this call are
    /// delivered. Subscribing to a completed stream yields an already-ended
    /// subscription.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = flume::unbounded();
        let mut state = self.state.lock();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        if !state.completed {
            state.subscribers.push((id, tx));
        }
        Subscription {
            id,
            rx,
            stream: Arc::downgrade(&self.state),
        }
    }

    /// Returns false if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        remove_subscriber(&self.state, id)
    }

    /// Delivers a clone of `record` to every live subscriber and returns how
    /// many received it. A no-op once the stream is completed.
    pub fn publish(&self, record: ServiceRecord) -> usize {
        let mut state = self.state.lock();
        if state.completed {
            tracing::debug!(service = %record.name, "Dropping record published after completion");
            return 0;
        }
        // Receivers that were dropped without unsubscribing are pruned here
        state
            .subscribers
            .retain(|(_, tx)| tx.send(record.clone()).is_ok());
        state.subscribers.len()
    }

    /// Ends the stream for every subscriber. Idempotent.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        if state.completed {
            return;
        }
        state.completed = true;
        let count = state.subscribers.len();
        state.subscribers.clear();
        tracing::debug!(subscribers = count, "Discovery event stream completed");
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

fn remove_subscriber(state: &Mutex<StreamState>, id: SubscriptionId) -> bool {
    let mut state = state.lock();
    let before = state.subscribers.len();
    state.subscribers.retain(|(sid, _)| *sid != id);
    state.subscribers.len() != before
}

/// Receiving end of one subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    rx: flume::Receiver<ServiceRecord>,
    stream: Weak<Mutex<StreamState>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next record, or `None` once the stream is completed and drained.
    pub async fn recv(&self) -> Option<ServiceRecord> {
        self.rx.recv_async().await.ok()
    }

    /// Next queued record without waiting.
    pub fn try_recv(&self) -> Option<ServiceRecord> {
        self.rx.try_recv().ok()
    }

    /// Records queued but not yet received
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.stream.upgrade() {
            remove_subscriber(&state, self.id);
        }
    }
}
