use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::{Event, EventKind, Subscriber, TransportError};

/// Grace for a pong (or any inbound frame) before the peer is considered dead.
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// Ping cadence: 9 × PONG_WAIT / 10.
pub const PING_PERIOD: Duration = Duration::from_secs(54);
/// Deadline for any single outbound write.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);
/// Largest inbound frame accepted (the read pump only consumes control traffic).
pub const MAX_MESSAGE_SIZE: usize = 512;
/// Per-client outbound buffer. A client that falls this far behind is cut.
pub const CLIENT_SEND_BUFFER: usize = 256;
/// Hub broadcast queue depth.
pub const BROADCAST_QUEUE_CAPACITY: usize = 256;
/// Register/unregister queue depth (buffered, same reason as the broker).
pub const CONTROL_QUEUE_CAPACITY: usize = 10;

enum HubControl {
    Register {
        id: String,
        sender: mpsc::Sender<Message>,
    },
    Unregister {
        id: String,
    },
}

struct HubInbox {
    broadcast: mpsc::Receiver<Event>,
    control: mpsc::Receiver<HubControl>,
}

/// Fan-out hub over the set of live WebSocket connections.
///
/// Backpressure policy: enqueueing to a client is non-blocking, and a full
/// send channel unregisters the client on the spot. Dropping the sender
/// closes the channel, which makes the write pump emit a close frame and
/// the connection tear itself down.
pub struct Hub {
    clients: RwLock<HashMap<String, mpsc::Sender<Message>>>,
    broadcast_tx: mpsc::Sender<Event>,
    control_tx: mpsc::Sender<HubControl>,
    inbox: Mutex<Option<HubInbox>>,
    dropped: AtomicU64,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY * 2);
        Self {
            clients: RwLock::new(HashMap::new()),
            broadcast_tx,
            control_tx,
            inbox: Mutex::new(Some(HubInbox {
                broadcast: broadcast_rx,
                control: control_rx,
            })),
            dropped: AtomicU64::new(0),
        }
    }

    /// Non-blocking enqueue onto the hub queue.
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

    pub fn register(&self, id: String, sender: mpsc::Sender<Message>) {
        if self
            .control_tx
            .try_send(HubControl::Register { id, sender })
            .is_err()
        {
            tracing::warn!("hub control queue unavailable, register dropped");
        }
    }

    pub fn unregister(&self, id: &str) {
        if self
            .control_tx
            .try_send(HubControl::Unregister { id: id.to_string() })
            .is_err()
        {
            tracing::warn!("hub control queue unavailable, unregister dropped");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Hub loop: register/unregister/broadcast until cancelled, then close
    /// every client send channel.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let Some(mut inbox) = self.inbox.lock().take() else {
            tracing::error!("hub loop already started");
            return;
        };

        tracing::debug!("websocket hub started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(ctl) = inbox.control.recv() => match ctl {
                    HubControl::Register { id, sender } => {
                        tracing::debug!(client = %id, "websocket client registered");
                        self.clients.write().insert(id, sender);
                    }
                    HubControl::Unregister { id } => {
                        if self.clients.write().remove(&id).is_some() {
                            tracing::debug!(client = %id, "websocket client unregistered");
                        }
                    }
                },
                Some(event) = inbox.broadcast.recv() => {
                    self.fan_out(&event);
                }
            }
        }

        let drained: Vec<String> = {
            let mut clients = self.clients.write();
            let ids = clients.keys().cloned().collect();
            clients.clear();
            ids
        };
        if !drained.is_empty() {
            tracing::debug!(clients = drained.len(), "websocket hub closed remaining clients");
        }
        tracing::debug!("websocket hub stopped");
    }

    fn fan_out(&self, event: &Event) {
        let frame = match encode_frame(event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(kind = %event.kind, error = %e, "failed to encode websocket frame");
                return;
            }
        };

        let snapshot: Vec<(String, mpsc::Sender<Message>)> = self
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (id.clone(), tx.clone()))
            .collect();

        let mut stale = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(client = %id, "send buffer full, disconnecting slow client");
                    stale.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => stale.push(id),
            }
        }

        if !stale.is_empty() {
            let mut clients = self.clients.write();
            for id in stale {
                clients.remove(&id);
            }
        }
    }
}

/// Outbound frames are the serialized Event: `{"type","timestamp","data"}`.
fn encode_frame(event: &Event) -> Result<Message, serde_json::Error> {
    Ok(Message::Text(serde_json::to_string(event)?.into()))
}

/// Broker-facing adapter. Errors bubble up for the broker to log; close is
/// a no-op because the hub loop owns client teardown on cancellation.
pub struct HubSubscriber {
    hub: Arc<Hub>,
}

impl HubSubscriber {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

impl Subscriber for HubSubscriber {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn send(&self, event: &Event) -> Result<(), TransportError> {
        self.hub.broadcast(event.clone())
    }

    fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

// ----- per-connection pumps ---------------------------------------------

/// Drive one upgraded socket: register with the hub, run both pumps, tear
/// down when either exits.
pub async fn serve_connection(socket: WebSocket, hub: Arc<Hub>, remote: String) {
    let client_id = format!("{}-{}", remote, chrono::Utc::now().timestamp());
    let (tx, rx) = mpsc::channel::<Message>(CLIENT_SEND_BUFFER);

    // Greeting goes through the same send channel as fan-out traffic.
    let welcome = Event::new(EventKind::ClientConnected, json!({ "client_id": client_id }));
    if let Ok(frame) = encode_frame(&welcome) {
        let _ = tx.try_send(frame);
    }

    hub.register(client_id.clone(), tx);
    tracing::debug!(client = %client_id, "websocket connection established");

    let (sink, stream) = socket.split();
    let mut write_task = tokio::spawn(write_pump(sink, rx));
    let mut read_task = tokio::spawn(read_pump(stream));

    enum Finished {
        Read,
        Write,
    }

    let finished = tokio::select! {
        _ = &mut read_task => Finished::Read,
        _ = &mut write_task => Finished::Write,
    };

    hub.unregister(&client_id);
    match finished {
        Finished::Read => {
            // Unregistering drops the sender; the write pump sees the closed
            // channel, sends a close frame and returns.
            let _ = tokio::time::timeout(WRITE_WAIT, write_task).await;
        }
        Finished::Write => read_task.abort(),
    }

    tracing::debug!(client = %client_id, "websocket connection closed");
}

/// Consume inbound traffic. The pump exists to process control frames and
/// notice disconnection; application data is not used. Every inbound frame
/// re-arms the PONG_WAIT deadline.
async fn read_pump(mut stream: SplitStream<WebSocket>) {
    loop {
        match tokio::time::timeout(PONG_WAIT, stream.next()).await {
            Err(_) => {
                tracing::debug!("websocket read deadline expired");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "websocket read error");
                return;
            }
            Ok(Some(Ok(Message::Close(_)))) => return,
            Ok(Some(Ok(_))) => {} // pong or ignored application frame
        }
    }
}

/// Serialize outbound traffic: send-channel frames, periodic pings, close
/// frame on channel close. Any write error ends the pump.
async fn write_pump(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Message>) {
    let start = tokio::time::Instant::now() + PING_PERIOD;
    let mut ping = tokio::time::interval_at(start, PING_PERIOD);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(frame) => {
                    match tokio::time::timeout(WRITE_WAIT, sink.send(frame)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::debug!(error = %e, "websocket write error");
                            return;
                        }
                        Err(_) => {
                            tracing::debug!("websocket write deadline expired");
                            return;
                        }
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            },
            _ = ping.tick() => {
                match tokio::time::timeout(WRITE_WAIT, sink.send(Message::Ping(Bytes::new()))).await {
                    Ok(Ok(())) => {}
                    _ => return,
                }
            }
        }
    }
}
