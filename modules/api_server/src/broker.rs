use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::{Event, EventKind, Subscriber};

/// Inbound event queue depth. Publishers drop (with a warning) beyond this.
pub const EVENT_QUEUE_CAPACITY: usize = 256;
/// Register/unregister queue depth. Buffered so transports can subscribe
/// during server construction, before the event loop has started.
pub const CONTROL_QUEUE_CAPACITY: usize = 10;

enum Control {
    Register(Arc<dyn Subscriber>),
    Unregister(Arc<dyn Subscriber>),
}

struct Inbox {
    events: mpsc::Receiver<Event>,
    control: mpsc::Receiver<Control>,
}

/// Single process-wide fan-out hub between catalog hooks and transports.
///
/// Publishers never block: `publish` is a bounded enqueue that drops on a
/// full queue. The event loop is the only consumer; on each event it takes
/// a read-lock snapshot of the subscriber list and dispatches one task per
/// subscriber, so a slow subscriber cannot delay the others.
pub struct Broker {
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
    event_tx: mpsc::Sender<Event>,
    control_tx: mpsc::Sender<Control>,
    inbox: Mutex<Option<Inbox>>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY * 2);
        Self {
            subscribers: RwLock::new(Vec::new()),
            event_tx,
            control_tx,
            inbox: Mutex::new(Some(Inbox {
                events: event_rx,
                control: control_rx,
            })),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Non-blocking publish. A full queue drops the event with a warning;
    /// this never returns an error to the caller.
    pub fn publish(&self, kind: EventKind, data: serde_json::Value) {
        let event = Event::new(kind, data);
        match self.event_tx.try_send(event) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind = %event.kind, "event queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!(kind = %event.kind, "broker stopped, dropping event");
            }
        }
    }

    /// Register a subscriber. Never blocks: the control queue is buffered
    /// so registration works before `run` has started.
    pub fn subscribe(&self, sub: Arc<dyn Subscriber>) {
        let name = sub.name();
        if self.control_tx.try_send(Control::Register(sub)).is_err() {
            tracing::warn!(subscriber = name, "broker control queue unavailable, subscribe dropped");
        }
    }

    /// Remove a subscriber and close it.
    pub fn unsubscribe(&self, sub: Arc<dyn Subscriber>) {
        let name = sub.name();
        if self.control_tx.try_send(Control::Unregister(sub)).is_err() {
            tracing::warn!(subscriber = name, "broker control queue unavailable, unsubscribe dropped");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn published_total(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Event loop. Runs until the token is cancelled, then closes every
    /// registered subscriber and returns. Calling it twice is a no-op.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let Some(mut inbox) = self.inbox.lock().take() else {
            tracing::error!("broker event loop already started");
            return;
        };

        tracing::debug!("broker event loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(ctl) = inbox.control.recv() => match ctl {
                    Control::Register(sub) => {
                        tracing::debug!(subscriber = sub.name(), "subscriber registered");
                        self.subscribers.write().push(sub);
                    }
                    Control::Unregister(sub) => {
                        let mut subs = self.subscribers.write();
                        if let Some(pos) = subs.iter().position(|s| Arc::ptr_eq(s, &sub)) {
                            let removed = subs.remove(pos);
                            drop(subs);
                            tracing::debug!(subscriber = removed.name(), "subscriber unregistered");
                            if let Err(e) = removed.close() {
                                tracing::warn!(subscriber = removed.name(), error = %e, "subscriber close failed");
                            }
                        }
                    }
                },
                Some(event) = inbox.events.recv() => {
                    let snapshot: Vec<Arc<dyn Subscriber>> = self.subscribers.read().clone();
                    for sub in snapshot {
                        let event = event.clone();
                        tokio::spawn(async move {
                            if let Err(e) = sub.send(&event) {
                                tracing::warn!(
                                    subscriber = sub.name(),
                                    kind = %event.kind,
                                    error = %e,
                                    "subscriber send failed"
                                );
                            }
                        });
                    }
                }
            }
        }

        let remaining: Vec<Arc<dyn Subscriber>> = self.subscribers.write().drain(..).collect();
        for sub in remaining {
            if let Err(e) = sub.close() {
                tracing::warn!(subscriber = sub.name(), error = %e, "subscriber close failed");
            }
        }
        tracing::debug!("broker event loop stopped");
    }
}
