//! Single-threaded-dispatch `EventBus`: events submitted from any worker are
//! forwarded, in submission order, to every subscriber.

use crate::event::Event;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

const DEFAULT_BROADCAST_CAPACITY: usize = 1000;

/// Process-owned event bus. Submissions from any number of concurrent
/// senders are funneled through a single mpsc channel into one forwarding
/// task, which is the sole writer to the broadcast channel — this is what
/// gives subscribers a consistent relative order regardless of which worker
/// thread produced which event.
#[derive(Debug)]
pub struct EventBus {
    sender: Mutex<Option<mpsc::UnboundedSender<Event>>>,
    broadcast_tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus with the default broadcast capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    /// Create a bus whose broadcast channel holds at most `capacity` events
    /// per lagging subscriber before it starts dropping the oldest ones.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Event>();
        let (broadcast_tx, _) = broadcast::channel(capacity);

        let broadcast_tx_clone = broadcast_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let _ = broadcast_tx_clone.send(event);
            }
        });

        Self {
            sender: Mutex::new(Some(sender)),
            broadcast_tx,
        }
    }

    /// Obtain a handle for submitting events, or `None` if [`shutdown`](Self::shutdown)
    /// has already been called.
    #[must_use]
    pub fn sender(&self) -> Option<EventSender> {
        self.sender
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| EventSender { inner: s.clone() }))
    }

    /// Stop accepting new events. Existing `EventSender` clones keep working
    /// (they hold their own channel handle); new callers of `sender()` get
    /// `None`. Safe to call more than once.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            let _ = guard.take();
        }
    }

    /// Subscribe to events submitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            inner: self.broadcast_tx.subscribe(),
        }
    }

    /// Number of currently active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for submitting events to an [`EventBus`]. Subscribers must not
/// block on receipt; a slow subscriber only stalls its own dispatch, never
/// the sender or other subscribers.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Submit an event. Errors only if the bus has been shut down and every
    /// `EventBus` handle dropped.
    pub fn send(&self, event: Event) -> Result<(), SendError> {
        self.inner.send(event).map_err(|_| SendError::Closed)
    }

    /// Whether the bus side of this channel is still open.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Handle for receiving events from an [`EventBus`].
#[derive(Debug)]
pub struct EventReceiver {
    inner: broadcast::Receiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.inner.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event receiver lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Poll for an event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.inner.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event receiver lagged, skipped events");
                }
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

/// Error returned when sending to a bus that has been shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The event bus has been closed.
    Closed,
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "event bus is closed"),
        }
    }
}

impl std::error::Error for SendError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LogLevel;

    #[tokio::test]
    async fn send_and_receive_preserves_identity() {
        let bus = EventBus::new();
        let sender = bus.sender().expect("sender available before shutdown");
        let mut receiver = bus.subscribe();

        let event = Event::log(LogLevel::Info, "hello");
        let id = event.id;
        sender.send(event).unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.id, id);
    }

    #[tokio::test]
    async fn events_arrive_in_submission_order() {
        let bus = EventBus::new();
        let sender = bus.sender().unwrap();
        let mut receiver = bus.subscribe();

        let e1 = Event::log(LogLevel::Info, "one");
        let e2 = Event::log(LogLevel::Info, "two");
        let e3 = Event::log(LogLevel::Info, "three");
        let ids = [e1.id, e2.id, e3.id];

        sender.send(e1).unwrap();
        sender.send(e2).unwrap();
        sender.send(e3).unwrap();

        for expected in ids {
            let received = receiver.recv().await.unwrap();
            assert_eq!(received.id, expected);
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = EventBus::new();
        let sender = bus.sender().unwrap();
        let mut r1 = bus.subscribe();
        let mut r2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = Event::log(LogLevel::Warn, "dup");
        let id = event.id;
        sender.send(event).unwrap();

        assert_eq!(r1.recv().await.unwrap().id, id);
        assert_eq!(r2.recv().await.unwrap().id, id);
    }

    #[tokio::test]
    async fn shutdown_stops_new_senders() {
        let bus = EventBus::new();
        bus.shutdown();
        assert!(bus.sender().is_none());
    }

    #[test]
    fn subscriber_count_tracks_drops() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let r1 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(r1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
