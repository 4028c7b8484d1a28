//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a node can start with zero
//! configuration against a relay on the local machine.

use std::path::PathBuf;
use std::time::Duration;

use varta_net::{resolve_endpoint, ChannelConfig, PresenceConfig};
use varta_shared::constants::{
    BEACON_INTERVAL_SECS, DEFAULT_RELAY_PORT, LIVENESS_WINDOW_SECS, OUTBOUND_QUEUE_CAPACITY,
    RECONNECT_DELAY_MS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay WebSocket endpoint.
    /// Env: `VARTA_RELAY_URL`, or resolved from `VARTA_ORIGIN_SCHEME`,
    /// `VARTA_ORIGIN_HOST` and `VARTA_ORIGIN_PORT`.
    /// Default: `ws://127.0.0.1:3000/ws`
    pub relay_url: String,

    /// Directory holding `varta.db`.
    /// Env: `VARTA_DATA_DIR`
    /// Default: platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Display name used when onboarding a fresh identity.
    /// Env: `VARTA_DISPLAY_NAME`
    pub display_name: Option<String>,

    /// Env: `VARTA_BEACON_SECS`
    pub beacon_interval: Duration,

    /// Env: `VARTA_LIVENESS_SECS`
    pub liveness_window: Duration,

    /// Env: `VARTA_RECONNECT_MS`
    pub reconnect_delay: Duration,

    /// Env: `VARTA_OUTBOUND_CAPACITY`
    pub outbound_capacity: usize,

    /// Whether invites addressed to us are accepted without asking.
    /// Env: `VARTA_AUTO_ACCEPT` (true/false)
    /// Default: `true`
    pub auto_accept_invites: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: resolve_endpoint("http", "127.0.0.1", Some(DEFAULT_RELAY_PORT)),
            data_dir: None,
            display_name: None,
            beacon_interval: Duration::from_secs(BEACON_INTERVAL_SECS),
            liveness_window: Duration::from_secs(LIVENESS_WINDOW_SECS),
            reconnect_delay: Duration::from_millis(RECONNECT_DELAY_MS),
            outbound_capacity: OUTBOUND_QUEUE_CAPACITY,
            auto_accept_invites: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("VARTA_RELAY_URL").filter(|u| !u.is_empty()) {
            config.relay_url = url;
        } else if let Some(host) = lookup("VARTA_ORIGIN_HOST") {
            let scheme = lookup("VARTA_ORIGIN_SCHEME").unwrap_or_else(|| "http".to_string());
            let port = match lookup("VARTA_ORIGIN_PORT") {
                Some(raw) => match raw.parse::<u16>() {
                    Ok(p) => Some(p),
                    Err(_) => {
                        tracing::warn!(value = %raw, "Invalid VARTA_ORIGIN_PORT, ignoring");
                        None
                    }
                },
                None => None,
            };
            config.relay_url = resolve_endpoint(&scheme, &host, port);
        }

        if let Some(dir) = lookup("VARTA_DATA_DIR").filter(|d| !d.is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(name) = lookup("VARTA_DISPLAY_NAME") {
            let name = name.trim().to_string();
            if !name.is_empty() {
                config.display_name = Some(name);
            }
        }

        if let Some(secs) = parse_positive(&lookup, "VARTA_BEACON_SECS") {
            config.beacon_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_positive(&lookup, "VARTA_LIVENESS_SECS") {
            config.liveness_window = Duration::from_secs(secs);
        }

        if let Some(ms) = parse_positive(&lookup, "VARTA_RECONNECT_MS") {
            config.reconnect_delay = Duration::from_millis(ms);
        }

        if let Some(n) = parse_positive(&lookup, "VARTA_OUTBOUND_CAPACITY") {
            config.outbound_capacity = n as usize;
        }

        if let Some(val) = lookup("VARTA_AUTO_ACCEPT") {
            config.auto_accept_invites = val != "false" && val != "0";
        }

        config
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.relay_url.clone(),
            reconnect_delay: self.reconnect_delay,
            outbound_capacity: self.outbound_capacity,
        }
    }

    pub fn presence_config(&self) -> PresenceConfig {
        PresenceConfig {
            beacon_interval: self.beacon_interval,
            liveness_window: self.liveness_window,
        }
    }
}

fn parse_positive<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(key = %key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config.relay_url, "ws://127.0.0.1:3000/ws");
        assert_eq!(config.beacon_interval, Duration::from_secs(5));
        assert_eq!(config.liveness_window, Duration::from_secs(20));
        assert_eq!(config.reconnect_delay, Duration::from_millis(1000));
        assert_eq!(config.outbound_capacity, 256);
        assert!(config.data_dir.is_none());
        assert!(config.auto_accept_invites);
    }

    #[test]
    fn test_explicit_relay_url_wins() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("VARTA_RELAY_URL", "wss://relay.example/ws"),
            ("VARTA_ORIGIN_HOST", "localhost"),
        ]));
        assert_eq!(config.relay_url, "wss://relay.example/ws");
    }

    #[test]
    fn test_origin_resolution() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("VARTA_ORIGIN_HOST", "localhost"),
            ("VARTA_ORIGIN_PORT", "5173"),
        ]));
        assert_eq!(config.relay_url, "ws://localhost:3000/ws");

        let config = ClientConfig::from_lookup(lookup(&[
            ("VARTA_ORIGIN_HOST", "varta.example"),
            ("VARTA_ORIGIN_SCHEME", "https"),
        ]));
        assert_eq!(config.relay_url, "wss://varta.example/ws");
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("VARTA_BEACON_SECS", "soon"),
            ("VARTA_LIVENESS_SECS", "0"),
            ("VARTA_RECONNECT_MS", "250"),
            ("VARTA_AUTO_ACCEPT", "0"),
        ]));
        assert!(!config.auto_accept_invites);
        assert_eq!(config.beacon_interval, Duration::from_secs(5));
        assert_eq!(config.liveness_window, Duration::from_secs(20));
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.channel_config().reconnect_delay, Duration::from_millis(250));
    }
}
