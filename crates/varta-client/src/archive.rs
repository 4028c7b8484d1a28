//! Message archive.
//!
//! A per-link, append-only log of chat pulses. Relays deliver at least once
//! and echo a sender's own messages back, so every append is guarded by the
//! pulse id: a given id is materialized at most once per link.
//!
//! Link rooms also carry realtime collaboration events (board strokes,
//! cursor moves, reactions). Those are never archived; they are handed to
//! the bus as `REMOTE_*` events for whatever renders them.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracing::{debug, info};

use varta_net::{BusEvent, ChannelClient, EventBus, EventName, PopSource};
use varta_shared::constants::GLOBAL_SIGNALING_ROOM;
use varta_shared::protocol::{Payload, RelayMessage};
use varta_shared::{now_millis, AssetKind, Identity, Pulse};
use varta_store::keys::archive_key;
use varta_store::{load_json, save_json, KeyValueStore};

use crate::suggest::{spawn_suggestions, ReplySuggester};

type Logs = BTreeMap<String, Vec<Pulse>>;

#[derive(Clone)]
pub struct MessageArchive {
    inner: Arc<ArchiveInner>,
}

struct ArchiveInner {
    owner_id: String,
    logs: Mutex<Logs>,
    store: Arc<dyn KeyValueStore>,
    channel: ChannelClient,
    bus: EventBus,
    suggester: Option<Arc<dyn ReplySuggester>>,
}

impl MessageArchive {
    pub fn new(
        owner_id: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        channel: ChannelClient,
        bus: EventBus,
        suggester: Option<Arc<dyn ReplySuggester>>,
    ) -> Self {
        Self {
            inner: Arc::new(ArchiveInner {
                owner_id: owner_id.into(),
                logs: Mutex::new(BTreeMap::new()),
                store,
                channel,
                bus,
                suggester,
            }),
        }
    }

    /// Subscribe to `RAW_SIGNAL` on the bus.
    pub fn attach(&self) {
        let weak: Weak<ArchiveInner> = Arc::downgrade(&self.inner);
        self.inner.bus.subscribe(EventName::RawSignal, move |event| {
            let (Some(inner), BusEvent::RawSignal(message)) = (weak.upgrade(), event) else {
                return;
            };
            MessageArchive { inner }.ingest(message);
        });
    }

    /// Send `body` to `link_id` as `identity`.
    ///
    /// Chat bodies are archived before anything goes on the wire, so the
    /// sender sees their own message immediately. Collaboration events are
    /// only relayed. The returned pulse carries the id used on the wire.
    pub fn dispatch(&self, identity: &Identity, link_id: &str, body: &str, asset_kind: AssetKind) -> Pulse {
        let now = now_millis();
        let pulse = Pulse {
            id: Pulse::new_id(now),
            link_id: link_id.to_string(),
            origin_id: identity.id.clone(),
            origin_name: identity.display_name.clone(),
            body: body.to_string(),
            timestamp: now,
            asset_kind,
        };

        if Payload::collab_kind(body).is_none() {
            self.archive(pulse.clone());
        }

        let message = RelayMessage {
            id: Some(pulse.id.clone()),
            room_id: link_id.to_string(),
            sender_id: pulse.origin_id.clone(),
            sender_name: pulse.origin_name.clone(),
            content: pulse.body.clone(),
            timestamp: pulse.timestamp,
            asset_type: Some(asset_kind.as_wire().to_string()),
        };
        self.inner.channel.send(link_id, message);

        pulse
    }

    /// Interpret one relayed envelope from a link room.
    pub fn ingest(&self, message: &RelayMessage) {
        if message.room_id == GLOBAL_SIGNALING_ROOM {
            return;
        }

        let payload = match Payload::decode_link(&message.content, message.asset_type.as_deref()) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(room = %message.room_id, error = %e, "Dropping malformed link traffic");
                return;
            }
        };

        let room_id = message.room_id.clone();
        let body = match payload {
            Payload::BoardStroke(payload) => {
                self.inner.bus.publish(BusEvent::RemoteBoardPulse { room_id, payload });
                return;
            }
            Payload::CursorMove(payload) => {
                self.inner.bus.publish(BusEvent::RemoteMousePulse { room_id, payload });
                return;
            }
            Payload::Reaction(payload) => {
                self.inner.bus.publish(BusEvent::RemotePopPulse {
                    room_id,
                    payload,
                    source: PopSource::Reaction,
                });
                return;
            }
            Payload::ChatText(body) | Payload::ChatFile(body) => body,
            other => {
                debug!(room = %room_id, kind = other.kind_name(), "Ignoring non-chat link traffic");
                return;
            }
        };

        let Some(id) = message.id.clone().filter(|id| !id.is_empty()) else {
            debug!(room = %room_id, sender = %message.sender_id, "Dropping chat envelope without id");
            return;
        };

        let pulse = Pulse {
            id,
            link_id: room_id.clone(),
            origin_id: message.sender_id.clone(),
            origin_name: message.sender_name.clone(),
            body,
            timestamp: if message.timestamp > 0 { message.timestamp } else { now_millis() },
            asset_kind: message.asset_kind(),
        };

        if !self.archive(pulse.clone()) || pulse.origin_id == self.inner.owner_id {
            return;
        }

        self.inner.bus.publish(BusEvent::RemotePopPulse {
            room_id,
            payload: serde_json::to_value(&pulse).unwrap_or(Value::Null),
            source: PopSource::Chat(pulse.clone()),
        });

        if let (Some(suggester), AssetKind::Text) = (&self.inner.suggester, pulse.asset_kind) {
            spawn_suggestions(suggester.clone(), self.inner.bus.clone(), pulse.body);
        }
    }

    /// Append `pulse` to its link's log unless that id is already there.
    /// Returns whether the pulse was new.
    pub fn archive(&self, pulse: Pulse) -> bool {
        {
            let mut logs = self.lock_logs();
            let log = logs.entry(pulse.link_id.clone()).or_default();
            if log.iter().any(|p| p.id == pulse.id) {
                debug!(pulse = %pulse.id, link = %pulse.link_id, "Duplicate pulse ignored");
                return false;
            }
            log.push(pulse.clone());
            self.persist_locked(&logs);
        }

        debug!(pulse = %pulse.id, link = %pulse.link_id, origin = %pulse.origin_id, "Pulse archived");
        self.inner.bus.publish(BusEvent::PulseArchived(pulse));
        true
    }

    /// Pulses of `link_id` in arrival order.
    pub fn history(&self, link_id: &str) -> Vec<Pulse> {
        self.lock_logs().get(link_id).cloned().unwrap_or_default()
    }

    /// Ids of every link with a log.
    pub fn links(&self) -> Vec<String> {
        self.lock_logs().keys().cloned().collect()
    }

    /// Hydrate from the persistence port. Returns the number of pulses
    /// loaded.
    pub fn load(&self) -> usize {
        let stored: Logs = load_json(self.inner.store.as_ref(), &archive_key(&self.inner.owner_id)).unwrap_or_default();
        let count = stored.values().map(Vec::len).sum();
        *self.lock_logs() = stored;
        info!(pulses = count, owner = %self.inner.owner_id, "Archive loaded");
        count
    }

    /// Drop the log of `link_id`. Returns the number of pulses removed.
    pub fn clear_link(&self, link_id: &str) -> usize {
        let mut logs = self.lock_logs();
        let removed = logs.remove(link_id).map_or(0, |log| log.len());
        if removed > 0 {
            self.persist_locked(&logs);
        }
        removed
    }

    fn persist_locked(&self, logs: &Logs) {
        save_json(self.inner.store.as_ref(), &archive_key(&self.inner.owner_id), logs);
    }

    fn lock_logs(&self) -> MutexGuard<'_, Logs> {
        self.inner.logs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
