//! Composition root.
//!
//! A [`Node`] owns one instance of every core component for a single local
//! identity and wires them together over one [`EventBus`]. Construction
//! hydrates persisted links and pulses; [`Node::start`] opens the relay
//! connection and starts beaconing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use varta_net::{BusEvent, ChannelClient, EventBus, EventName, Presence};
use varta_shared::{Identity, Link};
use varta_store::KeyValueStore;

use crate::archive::MessageArchive;
use crate::config::ClientConfig;
use crate::registry::LinkRegistry;
use crate::suggest::ReplySuggester;

type PendingInvites = Mutex<BTreeMap<String, Link>>;

pub struct Node {
    identity: Identity,
    bus: EventBus,
    channel: ChannelClient,
    presence: Presence,
    registry: Arc<LinkRegistry>,
    archive: MessageArchive,
    pending_invites: Arc<PendingInvites>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    pub fn new(
        identity: Identity,
        config: &ClientConfig,
        store: Arc<dyn KeyValueStore>,
        suggester: Option<Arc<dyn ReplySuggester>>,
    ) -> Self {
        let bus = EventBus::new();
        let channel = ChannelClient::new(config.channel_config(), bus.clone());

        let presence = Presence::new(
            identity.clone(),
            channel.clone(),
            bus.clone(),
            config.presence_config(),
        );
        presence.attach();

        let registry = Arc::new(LinkRegistry::new(
            identity.id.clone(),
            store.clone(),
            channel.clone(),
        ));
        registry.load_all();

        let archive = MessageArchive::new(
            identity.id.clone(),
            store,
            channel.clone(),
            bus.clone(),
            suggester,
        );
        archive.load();
        archive.attach();

        let pending_invites = Arc::new(PendingInvites::default());
        subscribe_invites(
            &bus,
            Arc::downgrade(&registry),
            Arc::downgrade(&pending_invites),
            config.auto_accept_invites,
        );

        info!(
            identity = %identity.id,
            name = %identity.display_name,
            links = registry.list().len(),
            "Node ready"
        );

        Self {
            identity,
            bus,
            channel,
            presence,
            registry,
            archive,
            pending_invites,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Connect to the relay and start the beacon loop. Calling it again is
    /// a no-op.
    pub fn start(&self) {
        let Some(connection) = self.channel.connect() else {
            return;
        };
        let beacon = self.presence.spawn_beacon_loop();
        self.lock_tasks().extend([connection, beacon]);
    }

    /// Abort the background tasks.
    pub fn shutdown(&self) {
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
        info!(identity = %self.identity.id, "Node stopped");
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn channel(&self) -> &ChannelClient {
        &self.channel
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn registry(&self) -> &LinkRegistry {
        &self.registry
    }

    pub fn archive(&self) -> &MessageArchive {
        &self.archive
    }

    /// Invites received but not accepted yet, ordered by link id.
    pub fn pending_invites(&self) -> Vec<Link> {
        lock_pending(&self.pending_invites).values().cloned().collect()
    }

    /// Remove and return the pending invite for `link_id`.
    pub fn take_invite(&self, link_id: &str) -> Option<Link> {
        lock_pending(&self.pending_invites).remove(link_id)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
    }
}

fn subscribe_invites(
    bus: &EventBus,
    registry: Weak<LinkRegistry>,
    pending: Weak<PendingInvites>,
    auto_accept: bool,
) {
    bus.subscribe(EventName::InviteReceived, move |event| {
        let BusEvent::InviteReceived(link) = event else {
            return;
        };
        let (Some(registry), Some(pending)) = (registry.upgrade(), pending.upgrade()) else {
            return;
        };

        if registry.contains(&link.link_id) {
            return;
        }

        if auto_accept {
            if let Err(e) = registry.accept_invite(link.clone()) {
                warn!(link = %link.link_id, error = %e, "Ignoring invalid invite");
            }
        } else {
            lock_pending(&pending).insert(link.link_id.clone(), link.clone());
        }
    });
}

fn lock_pending(pending: &PendingInvites) -> MutexGuard<'_, BTreeMap<String, Link>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
