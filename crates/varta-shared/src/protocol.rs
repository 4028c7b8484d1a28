//! Relay wire protocol and the shared-channel payload union.
//!
//! Two layers travel over the relay. The outer layer is the relay frame
//! (`{"event": .., "data": ..}`) whose `message` payload is a
//! [`RelayMessage`]. The inner layer is the `content` string of that
//! message: plain chat text, or a JSON sub-envelope tagged with `type`
//! (presence signaling or a realtime collaboration event). [`Payload`] is
//! the single place where `content` is classified.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VartaError;
use crate::identity::Identity;
use crate::types::{AssetKind, Link};

// ---------------------------------------------------------------------------
// Relay frames
// ---------------------------------------------------------------------------

/// Envelope relayed verbatim between peers in a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelayMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub room_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
}

impl RelayMessage {
    /// Build a signaling envelope carrying an encoded [`Signal`].
    pub fn signal(room_id: &str, sender: &Identity, signal: &Signal, now_ms: i64) -> Self {
        Self {
            id: None,
            room_id: room_id.to_string(),
            sender_id: sender.id.clone(),
            sender_name: sender.display_name.clone(),
            content: signal.encode(),
            timestamp: now_ms,
            asset_type: None,
        }
    }

    pub fn asset_kind(&self) -> AssetKind {
        AssetKind::from_wire(self.asset_type.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomRef {
    pub id: String,
}

impl RoomRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Frames a client sends to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinRoom(RoomRef),
    LeaveRoom(RoomRef),
    SendMessage(RelayMessage),
}

/// Frames the relay sends to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake carrying the connection's session id.
    Session { sid: String },
    RoomJoined(RoomRef),
    Message(RelayMessage),
}

impl ClientFrame {
    pub fn to_json(&self) -> Result<String, VartaError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, VartaError> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl ServerFrame {
    pub fn to_json(&self) -> Result<String, VartaError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, VartaError> {
        Ok(serde_json::from_str(raw)?)
    }
}

// ---------------------------------------------------------------------------
// Inner payloads
// ---------------------------------------------------------------------------

/// Presence and signaling sub-envelopes exchanged on the global room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Beacon {
        identity: Identity,
    },
    #[serde(rename_all = "camelCase")]
    Ping { sender_id: String, target_id: String },
    #[serde(rename_all = "camelCase")]
    Pong { identity: Identity, target_id: String },
    #[serde(rename_all = "camelCase")]
    Invite {
        target_id: String,
        #[serde(alias = "room")]
        link: Link,
    },
}

impl Signal {
    pub fn encode(&self) -> String {
        // A tagged enum of plain strings and maps always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    fn is_signal_tag(tag: &str) -> bool {
        matches!(tag, "BEACON" | "PING" | "PONG" | "INVITE")
    }
}

/// Realtime collaboration events multiplexed onto link rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollabKind {
    Board,
    Mouse,
    Pop,
}

impl CollabKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "BOARD_PULSE" => Some(Self::Board),
            "MOUSE_PULSE" => Some(Self::Mouse),
            "POP_PULSE" => Some(Self::Pop),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Board => "BOARD_PULSE",
            Self::Mouse => "MOUSE_PULSE",
            Self::Pop => "POP_PULSE",
        }
    }
}

/// Every shape the `content` of a [`RelayMessage`] can take.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Beacon(Identity),
    Ping { sender_id: String, target_id: String },
    Pong { identity: Identity, target_id: String },
    Invite { target_id: String, link: Link },
    ChatText(String),
    ChatFile(String),
    BoardStroke(Value),
    CursorMove(Value),
    Reaction(Value),
}

impl Payload {
    /// Classify a relay message body.
    ///
    /// A JSON object whose `type` names a signal must deserialize as that
    /// signal, otherwise the body is malformed. A JSON object whose `type`
    /// names a collaboration event is carried through untouched. Anything
    /// else is chat.
    pub fn decode(content: &str, asset_type: Option<&str>) -> Result<Self, VartaError> {
        if type_tag(content).is_some_and(|tag| Signal::is_signal_tag(&tag)) {
            let signal: Signal = serde_json::from_str(content)?;
            return Ok(signal.into());
        }
        Self::decode_link(content, asset_type)
    }

    /// Decode the content of a relay message.
    pub fn from_message(msg: &RelayMessage) -> Result<Self, VartaError> {
        Self::decode(&msg.content, msg.asset_type.as_deref())
    }

    /// Classify a body relayed on a link room.
    ///
    /// Signals only live on the global room, so here a signal-tagged body
    /// is ordinary chat. Only collaboration events are diverted.
    pub fn decode_link(content: &str, asset_type: Option<&str>) -> Result<Self, VartaError> {
        if let Some(kind) = Self::collab_kind(content) {
            let value: Value = serde_json::from_str(content)?;
            return Ok(match kind {
                CollabKind::Board => Payload::BoardStroke(value),
                CollabKind::Mouse => Payload::CursorMove(value),
                CollabKind::Pop => Payload::Reaction(value),
            });
        }

        Ok(match AssetKind::from_wire(asset_type) {
            AssetKind::Text => Payload::ChatText(content.to_string()),
            AssetKind::File => Payload::ChatFile(content.to_string()),
        })
    }

    /// The collaboration kind of a body, if it encodes one.
    pub fn collab_kind(content: &str) -> Option<CollabKind> {
        type_tag(content).and_then(|tag| CollabKind::from_tag(&tag))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Beacon(_) => "beacon",
            Payload::Ping { .. } => "ping",
            Payload::Pong { .. } => "pong",
            Payload::Invite { .. } => "invite",
            Payload::ChatText(_) => "chat_text",
            Payload::ChatFile(_) => "chat_file",
            Payload::BoardStroke(_) => "board_stroke",
            Payload::CursorMove(_) => "cursor_move",
            Payload::Reaction(_) => "reaction",
        }
    }
}

impl From<Signal> for Payload {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Beacon { identity } => Payload::Beacon(identity),
            Signal::Ping {
                sender_id,
                target_id,
            } => Payload::Ping {
                sender_id,
                target_id,
            },
            Signal::Pong {
                identity,
                target_id,
            } => Payload::Pong {
                identity,
                target_id,
            },
            Signal::Invite { target_id, link } => Payload::Invite { target_id, link },
        }
    }
}

/// The `type` field of a JSON object body, if the body is one.
fn type_tag(content: &str) -> Option<String> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    value.get("type")?.as_str().map(str::to_string)
}
