//! Presence and discovery protocol on the global signaling room.
//!
//! Every node broadcasts a `BEACON` with its identity on a fixed interval.
//! Receivers record the sender in their [`Directory`]. On top of that,
//! unicast `PING`/`PONG` lets a node confirm a specific peer is reachable
//! and `INVITE` proposes a link to one.
//!
//! Unicast signals still travel as global-room broadcasts; the receiver
//! filters on `targetId`. Relays echo a sender's own traffic back to it,
//! so self-originated beacons and pings are ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use varta_shared::constants::{BEACON_INTERVAL_SECS, GLOBAL_SIGNALING_ROOM, LIVENESS_WINDOW_SECS};
use varta_shared::identity::Identity;
use varta_shared::protocol::{Payload, RelayMessage, Signal};
use varta_shared::types::{now_millis, Link};

use crate::bus::{BusEvent, EventBus, EventName};
use crate::channel::ChannelClient;
use crate::directory::Directory;

#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub beacon_interval: Duration,
    pub liveness_window: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            beacon_interval: Duration::from_secs(BEACON_INTERVAL_SECS),
            liveness_window: Duration::from_secs(LIVENESS_WINDOW_SECS),
        }
    }
}

#[derive(Clone)]
pub struct Presence {
    inner: Arc<PresenceInner>,
}

struct PresenceInner {
    local: Identity,
    channel: ChannelClient,
    bus: EventBus,
    directory: Mutex<Directory>,
    config: PresenceConfig,
}

impl Presence {
    pub fn new(local: Identity, channel: ChannelClient, bus: EventBus, config: PresenceConfig) -> Self {
        let directory = Directory::new(config.liveness_window);
        Self {
            inner: Arc::new(PresenceInner {
                local,
                channel,
                bus,
                directory: Mutex::new(directory),
                config,
            }),
        }
    }

    /// Subscribe to `RAW_SIGNAL` on the bus.
    pub fn attach(&self) {
        let weak: Weak<PresenceInner> = Arc::downgrade(&self.inner);
        self.inner.bus.subscribe(EventName::RawSignal, move |event| {
            let (Some(inner), BusEvent::RawSignal(message)) = (weak.upgrade(), event) else {
                return;
            };
            Presence { inner }.handle_signal(message);
        });
    }

    /// Spawn the heartbeat task. It runs for the life of the process and
    /// only transmits while the relay is connected.
    pub fn spawn_beacon_loop(&self) -> JoinHandle<()> {
        let presence = self.clone();
        let period = self.inner.config.beacon_interval;
        info!(interval_secs = period.as_secs(), "Starting beacon loop");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if presence.inner.channel.is_connected() {
                    presence.beacon();
                }
            }
        })
    }

    /// Broadcast one beacon announcing the local identity.
    pub fn beacon(&self) {
        self.send_signal(&Signal::Beacon {
            identity: self.inner.local.clone(),
        });
    }

    /// Ask `target_id` to confirm its identity.
    pub fn probe(&self, target_id: &str) {
        debug!(target = %target_id, "Probing node");
        self.send_signal(&Signal::Ping {
            sender_id: self.inner.local.id.clone(),
            target_id: target_id.to_string(),
        });
    }

    /// Propose `link` to `target_id`.
    pub fn invite(&self, target_id: &str, link: &Link) {
        debug!(target = %target_id, link = %link.link_id, "Sending invite");
        self.send_signal(&Signal::Invite {
            target_id: target_id.to_string(),
            link: link.clone(),
        });
    }

    /// Interpret one relayed envelope. Anything outside the global room and
    /// anything malformed is ignored.
    pub fn handle_signal(&self, message: &RelayMessage) {
        if message.room_id != GLOBAL_SIGNALING_ROOM {
            return;
        }

        let payload = match Payload::from_message(message) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(sender = %message.sender_id, error = %e, "Dropping malformed signal");
                return;
            }
        };

        let local_id = self.inner.local.id.as_str();

        match payload {
            Payload::Beacon(identity) => {
                if message.sender_id == local_id || identity.id == local_id {
                    return;
                }
                self.lock_directory().observe(identity, now_millis());
            }
            Payload::Ping {
                sender_id,
                target_id,
            } => {
                if target_id != local_id || sender_id == local_id {
                    return;
                }
                debug!(from = %sender_id, "Answering ping");
                self.send_signal(&Signal::Pong {
                    identity: self.inner.local.clone(),
                    target_id: sender_id,
                });
            }
            Payload::Pong {
                identity,
                target_id,
            } => {
                if target_id != local_id || identity.id == local_id {
                    return;
                }
                let found = {
                    let mut directory = self.lock_directory();
                    directory.observe(identity.clone(), now_millis());
                    directory.get(&identity.id).cloned().unwrap_or(identity)
                };
                info!(peer = %found.id, name = %found.display_name, "Node found");
                self.inner.bus.publish(BusEvent::NodeFound(found));
            }
            Payload::Invite { target_id, link } => {
                if target_id != local_id {
                    return;
                }
                info!(link = %link.link_id, from = %message.sender_id, "Invite received");
                self.inner.bus.publish(BusEvent::InviteReceived(link));
            }
            other => {
                debug!(kind = other.kind_name(), "Ignoring non-signal traffic on global room");
            }
        }
    }

    pub fn local(&self) -> &Identity {
        &self.inner.local
    }

    /// Peers seen within the liveness window.
    pub fn live_nodes(&self) -> Vec<Identity> {
        self.live_nodes_at(now_millis())
    }

    pub fn live_nodes_at(&self, now_ms: i64) -> Vec<Identity> {
        self.lock_directory().live_nodes(now_ms)
    }

    /// Snapshot of the raw directory, stale entries included.
    pub fn directory(&self) -> Directory {
        self.lock_directory().clone()
    }

    /// Record a sighting directly, bypassing the wire.
    pub fn observe(&self, identity: Identity, now_ms: i64) {
        self.lock_directory().observe(identity, now_ms);
    }

    fn send_signal(&self, signal: &Signal) {
        let message = RelayMessage::signal(GLOBAL_SIGNALING_ROOM, &self.inner.local, signal, now_millis());
        self.inner.channel.send(GLOBAL_SIGNALING_ROOM, message);
    }

    fn lock_directory(&self) -> MutexGuard<'_, Directory> {
        self.inner
            .directory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use tokio::sync::mpsc;

    use super::*;
    use crate::channel::ChannelConfig;
    use varta_shared::protocol::ClientFrame;
    use varta_shared::types::LinkKind;

    struct Harness {
        presence: Presence,
        bus: EventBus,
        outbound: mpsc::Receiver<ClientFrame>,
    }

    fn harness(local_id: &str) -> Harness {
        let bus = EventBus::new();
        let channel = ChannelClient::new(ChannelConfig::default(), bus.clone());
        let outbound = channel.take_outbound("test-session").unwrap();
        let presence = Presence::new(
            Identity::with_id(local_id, local_id),
            channel,
            bus.clone(),
            PresenceConfig::default(),
        );
        presence.attach();
        Harness {
            presence,
            bus,
            outbound,
        }
    }

    fn global(sender: &Identity, signal: &Signal) -> RelayMessage {
        RelayMessage::signal(GLOBAL_SIGNALING_ROOM, sender, signal, now_millis())
    }

    fn sent_signals(rx: &mut mpsc::Receiver<ClientFrame>) -> Vec<Signal> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|frame| match frame {
                ClientFrame::SendMessage(m) => serde_json::from_str(&m.content).ok(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_beacon_updates_directory() {
        let h = harness("LIA-1");
        let peer = Identity::with_id("LIA-2", "bob");

        h.bus.publish(BusEvent::RawSignal(global(
            &peer,
            &Signal::Beacon {
                identity: peer.clone(),
            },
        )));

        let live = h.presence.live_nodes();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "LIA-2");
        assert!(live[0].last_seen > 0);
    }

    #[test]
    fn test_own_beacon_echo_is_ignored() {
        let h = harness("LIA-1");
        let me = h.presence.local().clone();

        h.presence.handle_signal(&global(
            &me,
            &Signal::Beacon {
                identity: me.clone(),
            },
        ));

        assert!(h.presence.directory().is_empty());
    }

    #[test]
    fn test_ping_for_us_is_answered_with_pong() {
        let mut h = harness("LIA-2");
        let prober = Identity::with_id("LIA-1", "ada");

        h.presence.handle_signal(&global(
            &prober,
            &Signal::Ping {
                sender_id: "LIA-1".into(),
                target_id: "LIA-2".into(),
            },
        ));

        let sent = sent_signals(&mut h.outbound);
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Signal::Pong {
                identity,
                target_id,
            } => {
                assert_eq!(identity.id, "LIA-2");
                assert_eq!(target_id, "LIA-1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ping_for_someone_else_or_from_self_is_ignored() {
        let mut h = harness("LIA-2");
        let prober = Identity::with_id("LIA-1", "ada");

        h.presence.handle_signal(&global(
            &prober,
            &Signal::Ping {
                sender_id: "LIA-1".into(),
                target_id: "LIA-3".into(),
            },
        ));
        h.presence.handle_signal(&global(
            &prober,
            &Signal::Ping {
                sender_id: "LIA-2".into(),
                target_id: "LIA-2".into(),
            },
        ));

        assert!(sent_signals(&mut h.outbound).is_empty());
    }

    #[test]
    fn test_pong_publishes_node_found() {
        let h = harness("LIA-1");
        let mut found = h.bus.subscribe_channel(EventName::NodeFound);
        let responder = Identity::with_id("LIA-2", "bob");

        h.presence.handle_signal(&global(
            &responder,
            &Signal::Pong {
                identity: responder.clone(),
                target_id: "LIA-1".into(),
            },
        ));

        match found.try_recv().unwrap() {
            BusEvent::NodeFound(identity) => assert_eq!(identity.id, "LIA-2"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.presence.directory().contains("LIA-2"));
    }

    #[test]
    fn test_invite_for_us_is_published() {
        let h = harness("LIA-2");
        let mut invites = h.bus.subscribe_channel(EventName::InviteReceived);
        let link = Link {
            link_id: "dm_LIA-1_LIA-2".into(),
            name: "ada".into(),
            kind: LinkKind::P2P,
            participants: BTreeSet::from(["LIA-1".to_string(), "LIA-2".to_string()]),
            description: "P2P Link".into(),
        };
        let inviter = Identity::with_id("LIA-1", "ada");

        h.presence.handle_signal(&global(
            &inviter,
            &Signal::Invite {
                target_id: "LIA-9".into(),
                link: link.clone(),
            },
        ));
        assert!(invites.try_recv().is_err());

        h.presence.handle_signal(&global(
            &inviter,
            &Signal::Invite {
                target_id: "LIA-2".into(),
                link: link.clone(),
            },
        ));
        assert_eq!(invites.try_recv().unwrap(), BusEvent::InviteReceived(link));
    }

    #[test]
    fn test_malformed_and_foreign_room_traffic_is_dropped() {
        let h = harness("LIA-1");
        let peer = Identity::with_id("LIA-2", "bob");

        let mut broken = global(&peer, &Signal::Beacon { identity: peer.clone() });
        broken.content = r#"{"type":"BEACON","identity":{"oops":true}}"#.into();
        h.presence.handle_signal(&broken);

        let mut elsewhere = global(&peer, &Signal::Beacon { identity: peer.clone() });
        elsewhere.room_id = "dm_LIA-1_LIA-2".into();
        h.presence.handle_signal(&elsewhere);

        let mut chatter = global(&peer, &Signal::Beacon { identity: peer.clone() });
        chatter.content = "just chatting".into();
        h.presence.handle_signal(&chatter);

        assert!(h.presence.directory().is_empty());
    }

    #[test]
    fn test_probe_and_beacon_emit_signals() {
        let mut h = harness("LIA-1");
        h.presence.probe("LIA-2");
        h.presence.beacon();

        let sent = sent_signals(&mut h.outbound);
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0],
            Signal::Ping {
                sender_id: "LIA-1".into(),
                target_id: "LIA-2".into()
            }
        );
        assert!(matches!(&sent[1], Signal::Beacon { identity } if identity.id == "LIA-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_beacon_loop_ticks() {
        let mut h = harness("LIA-1");
        let handle = h.presence.spawn_beacon_loop();

        // First tick fires immediately, then every five seconds.
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        handle.abort();

        let beacons = sent_signals(&mut h.outbound)
            .into_iter()
            .filter(|s| matches!(s, Signal::Beacon { .. }))
            .count();
        assert_eq!(beacons, 3);
    }
}
