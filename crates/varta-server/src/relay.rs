//! Room membership and message fan-out.
//!
//! Every connected client gets a session id and a bounded outbound queue.
//! Rooms are plain sets of session ids; messages to a room go to every
//! member, the sender included. The global signaling room is special: it
//! reaches every connected client whether or not it joined.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use varta_shared::constants::GLOBAL_SIGNALING_ROOM;
use varta_shared::protocol::{RelayMessage, RoomRef, ServerFrame};

use crate::config::RelayConfig;
use crate::error::RelayError;

#[derive(Default)]
struct Rooms {
    clients: HashMap<String, mpsc::Sender<String>>,
    members: HashMap<String, HashSet<String>>,
}

#[derive(Clone)]
pub struct RelayState {
    rooms: Arc<Mutex<Rooms>>,
    config: Arc<RelayConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub clients: usize,
    pub rooms: usize,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(Rooms::default())),
            config: Arc::new(config),
        }
    }

    /// Register a new connection. Returns its session id and the queue of
    /// encoded frames to write to it.
    pub fn register(&self) -> (String, mpsc::Receiver<String>) {
        let sid = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.config.client_queue.max(1));
        self.lock().clients.insert(sid.clone(), tx);
        info!(sid = %sid, "Client connected");
        (sid, rx)
    }

    /// Drop a connection and every membership it held. Its socket is
    /// closed once the queued frames are written.
    pub fn unregister(&self, sid: &str) {
        let mut rooms = self.lock();
        rooms.clients.remove(sid);
        rooms.members.retain(|_, members| {
            members.remove(sid);
            !members.is_empty()
        });
        info!(sid = %sid, "Client disconnected");
    }

    /// Add `sid` to `room` and acknowledge with `room_joined`.
    pub fn join(&self, sid: &str, room: &str) -> Result<(), RelayError> {
        let ack = ServerFrame::RoomJoined(RoomRef::new(room)).to_json()?;

        let mut rooms = self.lock();
        let tx = rooms
            .clients
            .get(sid)
            .cloned()
            .ok_or_else(|| RelayError::UnknownSession(sid.to_string()))?;

        let max = self.config.max_room_members;
        let members = rooms.members.entry(room.to_string()).or_default();
        if max > 0 && room != GLOBAL_SIGNALING_ROOM && !members.contains(sid) && members.len() >= max {
            return Err(RelayError::RoomFull {
                room: room.to_string(),
                max,
            });
        }
        members.insert(sid.to_string());
        drop(rooms);

        debug!(sid = %sid, room = %room, "Joined room");
        deliver(&tx, sid, ack);
        Ok(())
    }

    pub fn leave(&self, sid: &str, room: &str) {
        let mut rooms = self.lock();
        if let Some(members) = rooms.members.get_mut(room) {
            members.remove(sid);
            if members.is_empty() {
                rooms.members.remove(room);
            }
        }
        debug!(sid = %sid, room = %room, "Left room");
    }

    /// Fan `message` out to its room. Returns the number of clients the
    /// frame was queued for.
    pub fn route(&self, message: RelayMessage) -> Result<usize, RelayError> {
        let room = message.room_id.clone();
        let frame = ServerFrame::Message(message).to_json()?;

        let targets: Vec<(String, mpsc::Sender<String>)> = {
            let rooms = self.lock();
            if room == GLOBAL_SIGNALING_ROOM {
                rooms
                    .clients
                    .iter()
                    .map(|(sid, tx)| (sid.clone(), tx.clone()))
                    .collect()
            } else {
                rooms
                    .members
                    .get(&room)
                    .into_iter()
                    .flatten()
                    .filter_map(|sid| rooms.clients.get(sid).map(|tx| (sid.clone(), tx.clone())))
                    .collect()
            }
        };

        let delivered = targets
            .iter()
            .filter(|(sid, tx)| deliver(tx, sid, frame.clone()))
            .count();
        debug!(room = %room, delivered, "Relayed message");
        Ok(delivered)
    }

    /// Queue a frame for a single client.
    pub fn send_to(&self, sid: &str, frame: &ServerFrame) -> Result<(), RelayError> {
        let json = frame.to_json()?;
        let tx = self
            .lock()
            .clients
            .get(sid)
            .cloned()
            .ok_or_else(|| RelayError::UnknownSession(sid.to_string()))?;
        deliver(&tx, sid, json);
        Ok(())
    }

    pub fn members(&self, room: &str) -> Vec<String> {
        let mut members: Vec<String> = self
            .lock()
            .members
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub fn stats(&self) -> RelayStats {
        let rooms = self.lock();
        RelayStats {
            clients: rooms.clients.len(),
            rooms: rooms.members.len(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Rooms> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Best-effort enqueue. A slow client loses frames rather than stalling
/// the relay.
fn deliver(tx: &mpsc::Sender<String>, sid: &str, frame: String) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(sid = %sid, "Client queue full, dropping frame");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
