//! Relay channel client.
//!
//! Owns the single WebSocket connection to the relay. The connection runs
//! in a dedicated tokio task that reconnects forever; the rest of the
//! application talks to it through a cloneable [`ChannelClient`] handle.
//!
//! Outbound traffic goes through a fixed-capacity queue and is strictly
//! best-effort: frames are dropped while disconnected or when the queue is
//! full. Inbound `message` frames are republished on the bus as
//! `RAW_SIGNAL`, which is the only fan-in point for relay traffic.
//!
//! The relay does not remember room membership across connections, so
//! every (re)connect joins the global signaling room plus every room the
//! client has been asked to join.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use varta_shared::constants::{
    DEFAULT_RELAY_PORT, GLOBAL_SIGNALING_ROOM, OUTBOUND_QUEUE_CAPACITY, RECONNECT_DELAY_MS,
    RELAY_WS_PATH,
};
use varta_shared::protocol::{ClientFrame, RelayMessage, RoomRef, ServerFrame};

use crate::bus::{BusEvent, EventBus};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Resolve the relay endpoint for a page served from `scheme://host:port`.
///
/// Hosts on a local network served from anything other than the relay port
/// are development setups where the relay runs beside the page server on
/// port 3000. Everything else reaches the relay on the same origin.
pub fn resolve_endpoint(scheme: &str, host: &str, port: Option<u16>) -> String {
    let ws_scheme = match scheme.trim_end_matches(':') {
        "https" | "wss" => "wss",
        _ => "ws",
    };

    let is_local = host == "localhost"
        || host == "127.0.0.1"
        || host.starts_with("192.168.")
        || host.starts_with("10.")
        || host.starts_with("172.")
        || host.ends_with(".local");

    if is_local && port != Some(DEFAULT_RELAY_PORT) {
        return format!("{ws_scheme}://{host}:{DEFAULT_RELAY_PORT}{RELAY_WS_PATH}");
    }

    match port {
        Some(p) => format!("{ws_scheme}://{host}:{p}{RELAY_WS_PATH}"),
        None => format!("{ws_scheme}://{host}{RELAY_WS_PATH}"),
    }
}

/// Configuration for the relay connection.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Full WebSocket URL of the relay endpoint.
    pub url: String,
    /// Pause between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Capacity of the outbound queue.
    pub outbound_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: resolve_endpoint("http", "127.0.0.1", Some(DEFAULT_RELAY_PORT)),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            outbound_capacity: OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

#[derive(Clone)]
pub struct ChannelClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ChannelConfig,
    bus: EventBus,
    connected: AtomicBool,
    session_id: Mutex<Option<String>>,
    rooms: Mutex<BTreeSet<String>>,
    outbound_tx: mpsc::Sender<ClientFrame>,
    outbound_rx: Mutex<Option<mpsc::Receiver<ClientFrame>>>,
}

impl ChannelClient {
    pub fn new(config: ChannelConfig, bus: EventBus) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                config,
                bus,
                connected: AtomicBool::new(false),
                session_id: Mutex::new(None),
                rooms: Mutex::new(BTreeSet::new()),
                outbound_tx,
                outbound_rx: Mutex::new(Some(outbound_rx)),
            }),
        }
    }

    /// Spawn the connection task.
    ///
    /// Returns `None` if the connection was already started (or the
    /// outbound queue was handed to another transport).
    pub fn connect(&self) -> Option<JoinHandle<()>> {
        let outbound_rx = self.take_outbound_rx()?;
        let inner = self.inner.clone();
        info!(url = %inner.config.url, "Starting relay connection");
        Some(tokio::spawn(connection_loop(inner, outbound_rx)))
    }

    /// Hand the outbound queue to an external transport and mark the client
    /// connected under `session_id`.
    ///
    /// Used when frames are carried by something other than the built-in
    /// WebSocket connection, e.g. an in-process harness.
    pub fn take_outbound(&self, session_id: &str) -> Option<mpsc::Receiver<ClientFrame>> {
        let rx = self.take_outbound_rx()?;
        self.inner.set_session(Some(session_id.to_string()));
        self.inner.connected.store(true, Ordering::SeqCst);
        Some(rx)
    }

    /// Remember `room_id` for every future connection and join it now if
    /// connected.
    pub fn join(&self, room_id: &str) {
        let inserted = self.inner.lock_rooms().insert(room_id.to_string());
        if inserted {
            debug!(room = %room_id, "Tracking room");
        }
        self.enqueue(ClientFrame::JoinRoom(RoomRef::new(room_id)));
    }

    /// Forget `room_id` and leave it on the relay.
    pub fn leave(&self, room_id: &str) {
        self.inner.lock_rooms().remove(room_id);
        self.enqueue(ClientFrame::LeaveRoom(RoomRef::new(room_id)));
    }

    /// Relay `message` to `room_id`. Fire-and-forget.
    pub fn send(&self, room_id: &str, mut message: RelayMessage) {
        message.room_id = room_id.to_string();
        self.enqueue(ClientFrame::SendMessage(message));
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner
            .session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rooms joined on every (re)connect, excluding the global room.
    pub fn known_rooms(&self) -> Vec<String> {
        self.inner.lock_rooms().iter().cloned().collect()
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    fn enqueue(&self, frame: ClientFrame) {
        if !self.is_connected() {
            debug!(frame = ?frame_kind(&frame), "Relay offline, dropping frame");
            return;
        }
        if let Err(e) = self.inner.outbound_tx.try_send(frame) {
            debug!(error = %e, "Outbound relay queue unavailable, dropping frame");
        }
    }

    fn take_outbound_rx(&self) -> Option<mpsc::Receiver<ClientFrame>> {
        let rx = self
            .inner
            .outbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if rx.is_none() {
            warn!("Relay connection already started");
        }
        rx
    }
}

impl Inner {
    fn lock_rooms(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_session(&self, sid: Option<String>) {
        *self
            .session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = sid;
    }

    /// Interpret one inbound text frame.
    fn handle_text(&self, raw: &str) {
        match ServerFrame::from_json(raw) {
            Ok(ServerFrame::Message(message)) => {
                self.bus.publish(BusEvent::RawSignal(message));
            }
            Ok(ServerFrame::RoomJoined(room)) => {
                debug!(room = %room.id, "Room joined");
            }
            Ok(ServerFrame::Session { sid }) => {
                debug!(sid = %sid, "Ignoring repeated session frame");
            }
            Err(e) => {
                debug!(error = %e, "Dropping malformed relay frame");
            }
        }
    }
}

fn frame_kind(frame: &ClientFrame) -> &'static str {
    match frame {
        ClientFrame::JoinRoom(_) => "join_room",
        ClientFrame::LeaveRoom(_) => "leave_room",
        ClientFrame::SendMessage(_) => "send_message",
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

async fn connection_loop(inner: Arc<Inner>, mut outbound_rx: mpsc::Receiver<ClientFrame>) {
    let mut offline_announced = false;

    loop {
        match connect_async(inner.config.url.as_str()).await {
            Ok((socket, _)) => {
                offline_announced = false;
                run_session(&inner, socket, &mut outbound_rx).await;
            }
            Err(e) => {
                warn!(url = %inner.config.url, error = %e, "Relay connection failed");
            }
        }

        inner.connected.store(false, Ordering::SeqCst);
        inner.set_session(None);
        if !offline_announced {
            inner.bus.publish(BusEvent::Offline);
            offline_announced = true;
        }

        tokio::time::sleep(inner.config.reconnect_delay).await;
    }
}

async fn run_session(
    inner: &Arc<Inner>,
    socket: RelaySocket,
    outbound_rx: &mut mpsc::Receiver<ClientFrame>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let sid = match tokio::time::timeout(HANDSHAKE_TIMEOUT, ws_rx.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => match ServerFrame::from_json(text.as_str()) {
            Ok(ServerFrame::Session { sid }) => sid,
            _ => {
                warn!("Relay handshake did not start with a session frame");
                return;
            }
        },
        Ok(_) => {
            warn!("Relay closed during handshake");
            return;
        }
        Err(_) => {
            warn!("Relay handshake timed out");
            return;
        }
    };

    // Frames queued for the previous connection are stale.
    while outbound_rx.try_recv().is_ok() {}

    // Flip to connected before snapshotting rooms so a concurrent `join`
    // is either in the snapshot or queued behind it.
    inner.set_session(Some(sid.clone()));
    inner.connected.store(true, Ordering::SeqCst);

    let mut rooms = vec![GLOBAL_SIGNALING_ROOM.to_string()];
    rooms.extend(inner.lock_rooms().iter().cloned());

    for room in &rooms {
        if send_frame(&mut ws_tx, &ClientFrame::JoinRoom(RoomRef::new(room.as_str())))
            .await
            .is_err()
        {
            return;
        }
    }

    info!(sid = %sid, rooms = rooms.len(), "Relay connected");
    inner.bus.publish(BusEvent::Connected { session_id: sid });

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { return };
                if send_frame(&mut ws_tx, &frame).await.is_err() {
                    warn!("Relay write failed");
                    return;
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => inner.handle_text(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Relay closed the connection");
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Relay read failed");
                        return;
                    }
                }
            }
        }
    }
}

async fn send_frame<S>(ws_tx: &mut S, frame: &ClientFrame) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let json = match frame.to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to encode relay frame");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(json.into())).await.map_err(|_| ())
}
