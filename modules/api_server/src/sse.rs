use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::{Event, Subscriber, TransportError};

/// Per-client event buffer. Overflow skips events for that client only.
pub const SSE_CLIENT_BUFFER: usize = 256;
/// Broadcast queue depth.
pub const BROADCAST_QUEUE_CAPACITY: usize = 256;
/// Register/unregister queue depth (buffered, same reason as the broker).
pub const CONTROL_QUEUE_CAPACITY: usize = 10;

enum SseControl {
    Register {
        id: u64,
        sender: mpsc::Sender<Event>,
    },
    Unregister {
        id: u64,
    },
}

struct SseInbox {
    broadcast: mpsc::Receiver<Event>,
    control: mpsc::Receiver<SseControl>,
}

/// Fan-out hub for `text/event-stream` responses.
///
/// Unlike the WebSocket hub, a full client buffer does NOT disconnect: the
/// event is skipped for that client and logged. SSE clients have no fast
/// control channel for a deliberate close, so silently dropping is
/// friendlier than cutting the stream.
pub struct SseBroadcaster {
    clients: RwLock<HashMap<u64, mpsc::Sender<Event>>>,
    broadcast_tx: mpsc::Sender<Event>,
    control_tx: mpsc::Sender<SseControl>,
    inbox: Mutex<Option<SseInbox>>,
    next_id: AtomicU64,
    skipped: AtomicU64,
    dropped: AtomicU64,
}

impl Default for SseBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl SseBroadcaster {
    pub fn new() -> Self {
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY * 2);
        Self {
            clients: RwLock::new(HashMap::new()),
            broadcast_tx,
            control_tx,
            inbox: Mutex::new(Some(SseInbox {
                broadcast: broadcast_rx,
                control: control_rx,
            })),
            next_id: AtomicU64::new(1),
            skipped: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Non-blocking enqueue onto the broadcaster queue.
    pub fn broadcast(&self, event: Event) -> Result<(), TransportError> {
        match self.broadcast_tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::Backpressure)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }

    /// Open a client slot. The returned handle unregisters itself on drop,
    /// tying the registration to the HTTP request lifetime.
    pub fn subscribe(&self) -> SseClient {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SSE_CLIENT_BUFFER);
        if self
            .control_tx
            .try_send(SseControl::Register { id, sender: tx })
            .is_err()
        {
            tracing::warn!("sse control queue unavailable, register dropped");
        }
        SseClient {
            id,
            rx,
            control_tx: self.control_tx.clone(),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn skipped_total(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Broadcaster loop: register/unregister/broadcast until cancelled,
    /// then close every per-client channel (ending the HTTP streams).
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let Some(mut inbox) = self.inbox.lock().take() else {
            tracing::error!("sse broadcaster loop already started");
            return;
        };

        tracing::debug!("sse broadcaster started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(ctl) = inbox.control.recv() => match ctl {
                    SseControl::Register { id, sender } => {
                        tracing::debug!(client = id, "sse client registered");
                        self.clients.write().insert(id, sender);
                    }
                    SseControl::Unregister { id } => {
                        if self.clients.write().remove(&id).is_some() {
                            tracing::debug!(client = id, "sse client unregistered");
                        }
                    }
                },
                Some(event) = inbox.broadcast.recv() => {
                    self.fan_out(&event);
                }
            }
        }

        self.clients.write().clear();
        tracing::debug!("sse broadcaster stopped");
    }

    fn fan_out(&self, event: &Event) {
        let snapshot: Vec<(u64, mpsc::Sender<Event>)> = self
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut gone = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // skip for this client only, never disconnect
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(client = id, kind = %event.kind, "sse client buffer full, skipping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(id),
            }
        }

        if !gone.is_empty() {
            let mut clients = self.clients.write();
            for id in gone {
                clients.remove(&id);
            }
        }
    }
}

/// One registered SSE client: the receiving half plus drop-unregistration.
pub struct SseClient {
    id: u64,
    rx: mpsc::Receiver<Event>,
    control_tx: mpsc::Sender<SseControl>,
}

impl SseClient {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Drop for SseClient {
    fn drop(&mut self) {
        let _ = self.control_tx.try_send(SseControl::Unregister { id: self.id });
    }
}

/// Broker-facing adapter, mirroring the WebSocket one.
pub struct SseSubscriber {
    broadcaster: Arc<SseBroadcaster>,
}

impl SseSubscriber {
    pub fn new(broadcaster: Arc<SseBroadcaster>) -> Self {
        Self { broadcaster }
    }
}

impl Subscriber for SseSubscriber {
    fn name(&self) -> &'static str {
        "sse"
    }

    fn send(&self, event: &Event) -> Result<(), TransportError> {
        self.broadcaster.broadcast(event.clone())
    }

    fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
