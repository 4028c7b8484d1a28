// Relay networking layer: event bus, relay channel client, and the
// presence/discovery protocol running on the global signaling room.

pub mod bus;
pub mod channel;
pub mod directory;
pub mod presence;

pub use bus::{BusEvent, EventBus, EventName, PopSource};
pub use channel::{resolve_endpoint, ChannelClient, ChannelConfig};
pub use directory::Directory;
pub use presence::{Presence, PresenceConfig};
