//! Relay configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the relay can start with zero
//! configuration for local development.

use std::net::SocketAddr;

use varta_shared::constants::{DEFAULT_RELAY_PORT, OUTBOUND_QUEUE_CAPACITY};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address for the HTTP/WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// Maximum number of members per room (0 = unlimited). The global
    /// signaling room is never limited.
    /// Env: `MAX_ROOM_MEMBERS`
    /// Default: `0`
    pub max_room_members: usize,

    /// Frames buffered per client before further frames to it are dropped.
    /// Env: `CLIENT_QUEUE`
    /// Default: `256`
    pub client_queue: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_RELAY_PORT).into(),
            max_room_members: 0,
            client_queue: OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(val) = std::env::var("MAX_ROOM_MEMBERS") {
            if let Ok(n) = val.parse::<usize>() {
                config.max_room_members = n;
            }
        }

        if let Ok(val) = std::env::var("CLIENT_QUEUE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.client_queue = n,
                _ => tracing::warn!(value = %val, "Invalid CLIENT_QUEUE, using default"),
            }
        }

        config
    }
}
