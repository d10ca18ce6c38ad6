use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::task::{Context, Poll};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::event::{ChangeEvent, WatchOptions};

/// Internal subscriber: a filter paired with a bounded sender.
struct Subscriber {
    options: WatchOptions,
    sender: mpsc::Sender<ChangeEvent>,
    lag: LagSignal,
}

/// Set when the notifier dropped a subscriber for falling behind.
///
/// Clones observe the same flag, so it can outlive the [`Subscription`]
/// whose stream was moved elsewhere.
#[derive(Clone, Debug, Default)]
pub struct LagSignal(Arc<AtomicBool>);

impl LagSignal {
    pub fn is_lagged(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }
}

struct Registry {
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

impl Registry {
    fn remove(&self, id: u64) -> bool {
        self.subscribers
            .write()
            .expect("notifier lock poisoned")
            .remove(&id)
            .is_some()
    }
}

/// Fan-out of change events to the live subscribers of one branch.
///
/// Each subscriber gets its own bounded queue. A subscriber whose queue is
/// full or whose receiving end is gone is dropped on the next publish; the
/// publisher is never blocked and never sees the failure. Overflow raises the
/// subscriber's [`LagSignal`].
#[derive(Clone)]
pub struct ChangeNotifier {
    registry: Arc<Registry>,
    capacity: usize,
}

impl ChangeNotifier {
    /// `capacity` bounds how many undelivered live events a subscriber may
    /// hold before it is dropped.
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Register a subscriber.
    ///
    /// `backlog` is queued ahead of any live event; it must already be
    /// filtered for `options`. Callers that need gap-free catch-up build the
    /// backlog and subscribe without publishing in between.
    pub fn subscribe(&self, options: WatchOptions, backlog: Vec<ChangeEvent>) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity + backlog.len());
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let lag = LagSignal::default();
        let subscription = Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
            lag: lag.clone(),
        };

        for event in backlog {
            if let Err(e) = sender.try_send(event) {
                // Never registered: the stream ends after what was queued.
                warn!(subscriber = id, error = %e, "watch backlog rejected");
                lag.raise();
                return subscription;
            }
        }

        debug!(subscriber = id, filter = ?options.path_filter, "watch subscribed");
        self.registry
            .subscribers
            .write()
            .expect("notifier lock poisoned")
            .insert(id, Subscriber { options, sender, lag });
        subscription
    }

    /// Deliver `events`, in order, to every subscriber whose filter matches.
    pub fn publish(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }
        let mut subscribers = self.registry.subscribers.write().expect("notifier lock poisoned");
        subscribers.retain(|id, sub| {
            for event in events.iter().filter(|e| sub.options.matches(e)) {
                match sub.sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(subscriber = id, "watch queue full; dropping subscriber");
                        sub.lag.raise();
                        return false;
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(subscriber = id, "watch receiver gone");
                        return false;
                    }
                }
            }
            !sub.sender.is_closed()
        });
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .subscribers
            .read()
            .expect("notifier lock poisoned")
            .len()
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Receiving end of a watch.
///
/// Dropping it unsubscribes. The stream ends once the subscriber has been
/// dropped by the notifier or the notifier itself is gone. An ended stream
/// with [`Subscription::lagged`] set missed events: resubscribe with
/// `from_ctime` at the last timestamp seen to catch up.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<ChangeEvent>,
    registry: Weak<Registry>,
    lag: LagSignal,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    /// Next already-queued event, if any.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }

    /// Whether the notifier dropped this subscriber for falling behind.
    pub fn lagged(&self) -> bool {
        self.lag.is_lagged()
    }

    /// Shared view of [`Subscription::lagged`] for use after the stream has
    /// been moved.
    pub fn lag_signal(&self) -> LagSignal {
        self.lag.clone()
    }

    /// Stop receiving. Equivalent to dropping the subscription.
    pub fn cancel(self) {}
}

impl Stream for Subscription {
    type Item = ChangeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ChangeEvent>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(self.id) {
                debug!(subscriber = self.id, "watch cancelled");
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("lagged", &self.lagged())
            .finish()
    }
}
