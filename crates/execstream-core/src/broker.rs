//! In-process fan-out of entity updates to live subscribers.
//!
//! Each subscriber owns a bounded queue registered under a stream id.
//! Broadcasting never blocks: a full queue drops the update for that
//! subscriber only, and it will see the next one.

use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::execution::Execution;

/// Capacity of every subscriber queue.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 100;

/// An entity that can be fanned out by id.
pub trait Streamable: Clone + Send + 'static {
    /// Id of the stream this entity belongs to. Empty ids are never delivered.
    fn stream_id(&self) -> &str;
}

impl Streamable for Execution {
    fn stream_id(&self) -> &str {
        self.id()
    }
}

/// Delivery counts of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Queues the entity was enqueued into.
    pub delivered: usize,
    /// Queues that were full or already closed.
    pub dropped: usize,
}

struct Registered<T> {
    key: u64,
    tx: mpsc::Sender<T>,
}

/// Receiving end of one subscriber queue.
pub struct Subscription<T> {
    stream_id: String,
    key: u64,
    rx: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    /// Stream id this queue is registered under.
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Wait for the next entity. `None` once the queue is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next entity without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Number of queued entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Per-id registry of subscriber queues.
pub struct StreamBroker<T> {
    subscribers: RwLock<HashMap<String, Vec<Registered<T>>>>,
    next_key: AtomicU64,
}

impl<T: Streamable> Default for StreamBroker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Streamable> StreamBroker<T> {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_key: AtomicU64::new(1),
        }
    }

    /// Register a new queue under `stream_id`.
    ///
    /// The caller must hand the subscription back to [`Self::unsubscribe`]
    /// when done, or use [`Self::subscribe_guarded`].
    pub fn subscribe(&self, stream_id: &str) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let queues = subscribers.entry(stream_id.to_string()).or_default();
        queues.push(Registered { key, tx });

        tracing::debug!(
            stream_id,
            total_subscribers = queues.len(),
            "New subscriber registered"
        );

        Subscription {
            stream_id: stream_id.to_string(),
            key,
            rx,
        }
    }

    /// Register a queue that is deregistered when the guard drops.
    pub fn subscribe_guarded(self: &Arc<Self>, stream_id: &str) -> SubscriptionGuard<T> {
        SubscriptionGuard {
            broker: Arc::clone(self),
            subscription: self.subscribe(stream_id),
        }
    }

    /// Deregister and close a queue.
    ///
    /// Safe to call more than once; returns whether the queue was still
    /// registered. The id's entry is removed once its last queue is gone.
    pub fn unsubscribe(&self, subscription: &mut Subscription<T>) -> bool {
        let removed = {
            let mut subscribers = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);

            let removed = subscribers
                .get_mut(&subscription.stream_id)
                .and_then(|queues| {
                    let index = queues.iter().position(|r| r.key == subscription.key)?;
                    queues.remove(index);
                    Some(queues.len())
                });

            if removed == Some(0) {
                subscribers.remove(&subscription.stream_id);
            }
            removed
        };

        subscription.rx.close();

        if let Some(remaining) = removed {
            tracing::debug!(
                stream_id = %subscription.stream_id,
                remaining_subscribers = remaining,
                "Subscriber unregistered"
            );
        }
        removed.is_some()
    }

    /// Offer `entity` to every queue registered under its id.
    ///
    /// Never blocks and never fails. The lock is released before any
    /// enqueue.
    pub fn broadcast(&self, entity: &T) -> BroadcastOutcome {
        let stream_id = entity.stream_id();
        if stream_id.is_empty() {
            return BroadcastOutcome::default();
        }

        let senders: Vec<mpsc::Sender<T>> = {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match subscribers.get(stream_id) {
                Some(queues) => queues.iter().map(|r| r.tx.clone()).collect(),
                None => return BroadcastOutcome::default(),
            }
        };

        tracing::debug!(stream_id, subscribers = senders.len(), "Broadcasting update");

        let mut outcome = BroadcastOutcome::default();
        for tx in senders {
            match tx.try_send(entity.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    tracing::warn!(stream_id, "Subscriber queue full, dropping update");
                }
                Err(TrySendError::Closed(_)) => {
                    outcome.dropped += 1;
                    tracing::debug!(stream_id, "Subscriber queue closed, skipping");
                }
            }
        }
        outcome
    }

    /// Number of queues registered under `stream_id`.
    #[must_use]
    pub fn subscriber_count(&self, stream_id: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stream_id)
            .map_or(0, Vec::len)
    }

    /// Number of ids with at least one queue.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A subscription that deregisters itself on drop.
pub struct SubscriptionGuard<T: Streamable> {
    broker: Arc<StreamBroker<T>>,
    subscription: Subscription<T>,
}

impl<T: Streamable> Deref for SubscriptionGuard<T> {
    type Target = Subscription<T>;

    fn deref(&self) -> &Self::Target {
        &self.subscription
    }
}

impl<T: Streamable> DerefMut for SubscriptionGuard<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.subscription
    }
}

impl<T: Streamable> Drop for SubscriptionGuard<T> {
    fn drop(&mut self) {
        self.broker.unsubscribe(&mut self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionPhase;

    fn execution(id: &str, phase: ExecutionPhase) -> Execution {
        let mut execution = Execution::default();
        execution.metadata.id = id.to_string();
        execution.status.phase = phase;
        execution
    }

    #[test]
    fn test_broadcast_without_subscribers_is_noop() {
        let broker = StreamBroker::new();
        let outcome = broker.broadcast(&execution("e1", ExecutionPhase::Running));
        assert_eq!(outcome, BroadcastOutcome::default());
        assert_eq!(broker.stream_count(), 0);
    }

    #[test]
    fn test_broadcast_ignores_empty_id() {
        let broker = StreamBroker::new();
        let mut sub = broker.subscribe("");
        let outcome = broker.broadcast(&execution("", ExecutionPhase::Running));
        assert_eq!(outcome.delivered, 0);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_broadcast_reaches_every_subscriber() {
        let broker = StreamBroker::new();
        let mut subs: Vec<_> = (0..5).map(|_| broker.subscribe("e1")).collect();
        let mut other = broker.subscribe("e2");

        let update = execution("e1", ExecutionPhase::Running);
        let outcome = broker.broadcast(&update);

        assert_eq!(outcome.delivered, 5);
        for sub in &mut subs {
            assert_eq!(sub.try_recv(), Some(update.clone()));
        }
        assert!(other.try_recv().is_none());
    }

    #[test]
    fn test_per_subscriber_fifo() {
        let broker = StreamBroker::new();
        let mut sub = broker.subscribe("e1");

        broker.broadcast(&execution("e1", ExecutionPhase::Pending));
        broker.broadcast(&execution("e1", ExecutionPhase::Running));
        broker.broadcast(&execution("e1", ExecutionPhase::Completed));

        let phases: Vec<_> = std::iter::from_fn(|| sub.try_recv())
            .map(|e| e.phase())
            .collect();
        assert_eq!(
            phases,
            vec![
                ExecutionPhase::Pending,
                ExecutionPhase::Running,
                ExecutionPhase::Completed
            ]
        );
    }

    #[test]
    fn test_full_queue_drops_for_that_subscriber_only() {
        let broker = StreamBroker::new();
        let mut slow = broker.subscribe("e1");
        let mut fast = broker.subscribe("e1");

        let update = execution("e1", ExecutionPhase::Running);
        for _ in 0..SUBSCRIBER_QUEUE_CAPACITY {
            broker.broadcast(&update);
            assert!(fast.try_recv().is_some());
        }
        assert_eq!(slow.len(), SUBSCRIBER_QUEUE_CAPACITY);

        let outcome = broker.broadcast(&update);
        assert_eq!(outcome, BroadcastOutcome { delivered: 1, dropped: 1 });
        assert_eq!(slow.len(), SUBSCRIBER_QUEUE_CAPACITY);
        assert!(fast.try_recv().is_some());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let broker = StreamBroker::new();
        let mut first = broker.subscribe("e1");
        let mut second = broker.subscribe("e1");

        assert!(broker.unsubscribe(&mut first));
        assert!(!broker.unsubscribe(&mut first));
        assert_eq!(broker.subscriber_count("e1"), 1);

        let update = execution("e1", ExecutionPhase::Running);
        assert_eq!(broker.broadcast(&update).delivered, 1);
        assert_eq!(second.try_recv(), Some(update));
        assert!(first.try_recv().is_none());

        assert!(broker.unsubscribe(&mut second));
        assert_eq!(broker.subscriber_count("e1"), 0);
        assert_eq!(broker.stream_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_queue() {
        let broker = StreamBroker::new();
        let mut sub = broker.subscribe("e1");
        broker.broadcast(&execution("e1", ExecutionPhase::Running));

        broker.unsubscribe(&mut sub);
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_guard_unsubscribes_on_drop() {
        let broker = Arc::new(StreamBroker::new());
        {
            let mut guard = broker.subscribe_guarded("e1");
            assert_eq!(broker.subscriber_count("e1"), 1);
            broker.broadcast(&execution("e1", ExecutionPhase::Running));
            assert!(guard.try_recv().is_some());
        }
        assert_eq!(broker.subscriber_count("e1"), 0);
        assert_eq!(broker.stream_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_and_broadcast() {
        let broker = Arc::new(StreamBroker::new());
        let mut subs: Vec<_> = (0..10).map(|_| broker.subscribe("e1")).collect();

        let publishers = (0..SUBSCRIBER_QUEUE_CAPACITY).map(|_| {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                broker.broadcast(&execution("e1", ExecutionPhase::Running));
            })
        });
        let churn = (0..20).map(|i| {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                let mut sub = broker.subscribe(&format!("other-{i}"));
                broker.unsubscribe(&mut sub);
            })
        });

        for handle in futures::future::join_all(publishers.chain(churn)).await {
            handle.unwrap();
        }

        for sub in &mut subs {
            assert_eq!(sub.len(), SUBSCRIBER_QUEUE_CAPACITY);
        }
        assert_eq!(broker.stream_count(), 1);
    }
}
