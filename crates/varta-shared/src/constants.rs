/// Application name
pub const APP_NAME: &str = "Varta";

/// Room every node joins for presence and signaling traffic
pub const GLOBAL_SIGNALING_ROOM: &str = "varta_global_signaling";

/// Interval between presence beacons in seconds
pub const BEACON_INTERVAL_SECS: u64 = 5;

/// A directory entry older than this is treated as stale (seconds)
pub const LIVENESS_WINDOW_SECS: u64 = 20;

/// Delay between relay reconnection attempts in milliseconds
pub const RECONNECT_DELAY_MS: u64 = 1_000;

/// Capacity of the outbound relay queue; sends beyond it are dropped
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Port the relay listens on by default
pub const DEFAULT_RELAY_PORT: u16 = 3000;

/// Path of the relay WebSocket endpoint
pub const RELAY_WS_PATH: &str = "/ws";

/// Maximum number of reply suggestions surfaced per message
pub const MAX_SUGGESTIONS: usize = 3;

/// Identity id prefix
pub const IDENTITY_PREFIX: &str = "LIA-";

/// Link id prefixes
pub const P2P_LINK_PREFIX: &str = "dm_";
pub const GROUP_LINK_PREFIX: &str = "gid_";

/// Persistence keys
pub const SESSION_KEY: &str = "varta_session";
pub const LINKS_KEY_PREFIX: &str = "varta_links_";
pub const ARCHIVE_KEY_PREFIX: &str = "varta_archive_";
