//! # varta-server
//!
//! The Varta relay: a WebSocket room pub/sub server. Peers never talk to
//! each other directly; every signal and chat pulse goes through here.
//!
//! - `GET /ws` upgrades to the relay protocol (`session`, `join_room`,
//!   `leave_room`, `send_message`, `room_joined`, `message` frames)
//! - `GET /health` reports liveness and connection counts

pub mod api;
pub mod config;
pub mod error;
pub mod relay;

pub use api::{build_router, serve};
pub use config::RelayConfig;
pub use error::RelayError;
pub use relay::{RelayState, RelayStats};
