//! End-to-end tests: a real relay on an ephemeral port, driven by raw
//! WebSocket clients, `ChannelClient`s and full nodes.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use varta_client::commands::{links, messaging};
use varta_client::{ClientConfig, Node};
use varta_net::{
    BusEvent, ChannelClient, ChannelConfig, EventBus, EventName, Presence, PresenceConfig,
};
use varta_server::{serve, RelayConfig, RelayState};
use varta_shared::constants::GLOBAL_SIGNALING_ROOM;
use varta_shared::protocol::{ClientFrame, RelayMessage, RoomRef, ServerFrame};
use varta_shared::{now_millis, AssetKind, Identity, LinkKind};
use varta_store::MemoryStore;

const WAIT: Duration = Duration::from_secs(5);

/// Start a relay on an ephemeral port and return its WebSocket URL.
async fn start_relay() -> (String, RelayState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = RelayState::new(RelayConfig::default());
    tokio::spawn(serve(listener, state.clone()));
    (format!("ws://127.0.0.1:{port}/ws"), state)
}

async fn next_matching<F>(rx: &mut UnboundedReceiver<BusEvent>, mut pred: F) -> BusEvent
where
    F: FnMut(&BusEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn connected_channel(url: &str, bus: &EventBus) -> ChannelClient {
    let mut connected = bus.subscribe_channel(EventName::Connected);
    let channel = ChannelClient::new(
        ChannelConfig {
            url: url.to_string(),
            reconnect_delay: Duration::from_millis(100),
            ..ChannelConfig::default()
        },
        bus.clone(),
    );
    channel.connect().unwrap();
    next_matching(&mut connected, |_| true).await;
    channel
}

async fn wait_until<F>(mut cond: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

fn chat(room: &str, sender: &str, content: &str) -> RelayMessage {
    RelayMessage {
        id: Some(format!("P-{}-123", now_millis())),
        room_id: room.into(),
        sender_id: sender.into(),
        sender_name: sender.into(),
        content: content.into(),
        timestamp: now_millis(),
        asset_type: None,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let (url, _state) = start_relay().await;
    let addr = url.trim_start_matches("ws://").trim_end_matches("/ws").to_string();

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(WAIT, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(r#""status":"ok""#));
    assert!(response.contains(r#""clients":0"#));
}

#[tokio::test]
async fn test_raw_handshake_and_disconnect() {
    let (url, state) = start_relay().await;

    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    let first = ws.next().await.unwrap().unwrap();
    let sid = match ServerFrame::from_json(first.to_text().unwrap()).unwrap() {
        ServerFrame::Session { sid } => sid,
        other => panic!("unexpected {other:?}"),
    };
    assert!(!sid.is_empty());

    let join = ClientFrame::JoinRoom(RoomRef::new("gid_00000001")).to_json().unwrap();
    ws.send(Message::Text(join.into())).await.unwrap();

    let ack = tokio::time::timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(
        ServerFrame::from_json(ack.to_text().unwrap()).unwrap(),
        ServerFrame::RoomJoined(RoomRef::new("gid_00000001"))
    );
    assert_eq!(state.members("gid_00000001"), vec![sid]);

    ws.send(Message::Text("garbage".into())).await.unwrap();
    ws.close(None).await.unwrap();

    wait_until(|| state.stats().clients == 0).await;
    assert!(state.members("gid_00000001").is_empty());
}

#[tokio::test]
async fn test_dropped_session_reconnects_and_rejoins_rooms() {
    let (url, state) = start_relay().await;

    let bus = EventBus::new();
    let mut offline = bus.subscribe_channel(EventName::Offline);
    let channel = connected_channel(&url, &bus).await;
    let mut connected = bus.subscribe_channel(EventName::Connected);

    channel.join("gid_sticky");
    let first = channel.session_id().unwrap();
    wait_until(|| state.members("gid_sticky") == vec![first.clone()]).await;
    assert!(state.members(GLOBAL_SIGNALING_ROOM).contains(&first));

    // The relay forgets the session and hangs up on it.
    state.unregister(&first);

    next_matching(&mut offline, |_| true).await;
    let second = match next_matching(&mut connected, |_| true).await {
        BusEvent::Connected { session_id } => session_id,
        other => panic!("unexpected {other:?}"),
    };
    assert_ne!(first, second);
    assert_eq!(channel.session_id().as_deref(), Some(second.as_str()));

    // Known rooms and the global room are joined again on the new session.
    wait_until(|| state.members("gid_sticky") == vec![second.clone()]).await;
    wait_until(|| state.members(GLOBAL_SIGNALING_ROOM) == vec![second.clone()]).await;

    // One outage, one OFFLINE.
    assert!(offline.try_recv().is_err());
}

#[tokio::test]
async fn test_room_routing_between_channel_clients() {
    let (url, _state) = start_relay().await;

    let bus_a = EventBus::new();
    let bus_b = EventBus::new();
    let mut raw_a = bus_a.subscribe_channel(EventName::RawSignal);
    let mut raw_b = bus_b.subscribe_channel(EventName::RawSignal);

    let a = connected_channel(&url, &bus_a).await;
    let b = connected_channel(&url, &bus_b).await;
    assert!(a.is_connected());
    assert_ne!(a.session_id(), b.session_id());

    a.join("gid_private");
    // Give the join time to land before sending into the room.
    tokio::time::sleep(Duration::from_millis(100)).await;

    a.send("gid_private", chat("gid_private", "LIA-1", "secret"));
    a.send(GLOBAL_SIGNALING_ROOM, chat(GLOBAL_SIGNALING_ROOM, "LIA-1", "hello all"));

    // The sender hears its own room message back.
    let echoed = next_matching(&mut raw_a, |e| {
        matches!(e, BusEvent::RawSignal(m) if m.content == "secret")
    })
    .await;
    assert!(matches!(echoed, BusEvent::RawSignal(m) if m.room_id == "gid_private"));

    // B is not in the room, so the first thing it sees is the global one.
    let first_b = next_matching(&mut raw_b, |_| true).await;
    assert!(matches!(first_b, BusEvent::RawSignal(m) if m.content == "hello all"));
}

#[tokio::test]
async fn test_presence_probe_over_relay() {
    let (url, _state) = start_relay().await;

    let bus_a = EventBus::new();
    let bus_b = EventBus::new();
    let mut found = bus_a.subscribe_channel(EventName::NodeFound);

    let a = connected_channel(&url, &bus_a).await;
    let b = connected_channel(&url, &bus_b).await;

    let presence_a = Presence::new(
        Identity::with_id("LIA-1", "ada"),
        a,
        bus_a.clone(),
        PresenceConfig::default(),
    );
    let presence_b = Presence::new(
        Identity::with_id("LIA-2", "bob"),
        b,
        bus_b.clone(),
        PresenceConfig::default(),
    );
    presence_a.attach();
    presence_b.attach();

    presence_b.beacon();
    presence_a.probe("LIA-2");

    match next_matching(&mut found, |_| true).await {
        BusEvent::NodeFound(identity) => assert_eq!(identity.id, "LIA-2"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(presence_a.directory().contains("LIA-2"));
    assert_eq!(presence_a.directory().get("LIA-2").unwrap().display_name, "bob");
}

fn node(url: &str, id: &str, name: &str) -> Node {
    let config = ClientConfig {
        relay_url: url.to_string(),
        beacon_interval: Duration::from_millis(200),
        reconnect_delay: Duration::from_millis(100),
        ..ClientConfig::default()
    };
    Node::new(
        Identity::with_id(id, name),
        &config,
        Arc::new(MemoryStore::new()),
        None,
    )
}

#[tokio::test]
async fn test_p2p_handshake_and_chat_between_nodes() {
    let (url, _state) = start_relay().await;

    let ada = node(&url, "LIA-1", "ada");
    let bob = node(&url, "LIA-2", "bob");

    let mut ada_connected = ada.bus().subscribe_channel(EventName::Connected);
    let mut bob_connected = bob.bus().subscribe_channel(EventName::Connected);
    let mut ada_found = ada.bus().subscribe_channel(EventName::NodeFound);
    let mut bob_invites = bob.bus().subscribe_channel(EventName::InviteReceived);
    let mut bob_archived = bob.bus().subscribe_channel(EventName::PulseArchived);

    ada.start();
    bob.start();
    next_matching(&mut ada_connected, |_| true).await;
    next_matching(&mut bob_connected, |_| true).await;

    // Probe, pong, directory entry.
    ada.presence().probe("LIA-2");
    next_matching(&mut ada_found, |e| matches!(e, BusEvent::NodeFound(i) if i.id == "LIA-2")).await;
    assert!(ada.presence().directory().contains("LIA-2"));

    // Quick handshake derives the shared id and invites bob.
    let link = links::quick_handshake(&ada, "LIA-2").unwrap();
    assert_eq!(link.id, "dm_LIA-1_LIA-2");
    assert_eq!(link.kind, LinkKind::P2P);
    assert_eq!(link.participants, vec!["LIA-1".to_string(), "LIA-2".to_string()]);

    next_matching(&mut bob_invites, |_| true).await;
    let accepted = bob.registry().get("dm_LIA-1_LIA-2").unwrap();
    assert_eq!(accepted.name, "ada");

    // Bob's join is queued behind the invite handling; give it a moment.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let sent = messaging::send_message(&ada, "dm_LIA-1_LIA-2", "hello bob", AssetKind::Text).unwrap();
    match next_matching(&mut bob_archived, |_| true).await {
        BusEvent::PulseArchived(pulse) => {
            assert_eq!(pulse.id, sent.id);
            assert_eq!(pulse.body, "hello bob");
            assert_eq!(pulse.origin_id, "LIA-1");
        }
        other => panic!("unexpected {other:?}"),
    }

    // Ada's own echo from the relay does not duplicate her local copy.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(ada.archive().history("dm_LIA-1_LIA-2").len(), 1);
    assert_eq!(bob.archive().history("dm_LIA-1_LIA-2").len(), 1);

    // Beacons keep both directories populated.
    tokio::time::timeout(WAIT, async {
        while !bob.presence().directory().contains("LIA-1") {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .unwrap();

    ada.shutdown();
    bob.shutdown();
}
