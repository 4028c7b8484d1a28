//! Link registry.
//!
//! Owns every link the local identity takes part in. Links are keyed by id
//! and creation is idempotent on that id, so two peers racing to open the
//! same P2P link converge on one record and one room subscription each.
//! Every mutation rewrites the full link set under the identity's key.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use varta_net::{ChannelClient, Presence};
use varta_shared::constants::{GLOBAL_SIGNALING_ROOM, GROUP_LINK_PREFIX, P2P_LINK_PREFIX};
use varta_shared::{Identity, Link, LinkKind};
use varta_store::keys::links_key;
use varta_store::{load_json, save_json, KeyValueStore};

use crate::error::RegistryError;

const P2P_DESCRIPTION: &str = "P2P Link";
const GROUP_DESCRIPTION: &str = "Group Link";

/// Canonical id of the P2P link between `a` and `b`. Symmetric in its
/// arguments.
pub fn derive_p2p_id(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{P2P_LINK_PREFIX}{lo}_{hi}")
}

/// Random id for a new group link.
pub fn new_group_id() -> String {
    let bytes: [u8; 4] = rand::random();
    format!("{GROUP_LINK_PREFIX}{}", hex::encode(bytes))
}

pub struct LinkRegistry {
    owner_id: String,
    links: Mutex<BTreeMap<String, Link>>,
    store: Arc<dyn KeyValueStore>,
    channel: ChannelClient,
}

impl LinkRegistry {
    pub fn new(owner_id: impl Into<String>, store: Arc<dyn KeyValueStore>, channel: ChannelClient) -> Self {
        Self {
            owner_id: owner_id.into(),
            links: Mutex::new(BTreeMap::new()),
            store,
            channel,
        }
    }

    /// Create a link, or return the existing record with the same id.
    ///
    /// P2P links need exactly two participants and get their id from the
    /// pair. Group links get a fresh random id and always include the local
    /// identity.
    pub fn create(
        &self,
        kind: LinkKind,
        name: &str,
        participants: impl IntoIterator<Item = String>,
    ) -> Result<Link, RegistryError> {
        let mut participants: BTreeSet<String> = participants.into_iter().collect();

        let link = match kind {
            LinkKind::P2P => {
                let link_id = match participants.iter().collect::<Vec<_>>().as_slice() {
                    [a, b] => derive_p2p_id(a, b),
                    _ => return Err(RegistryError::InvalidP2PParticipants(participants.len())),
                };
                Link {
                    link_id,
                    name: name.to_string(),
                    kind,
                    participants,
                    description: P2P_DESCRIPTION.to_string(),
                }
            }
            LinkKind::Group => {
                participants.insert(self.owner_id.clone());
                Link {
                    link_id: new_group_id(),
                    name: name.to_string(),
                    kind,
                    participants,
                    description: GROUP_DESCRIPTION.to_string(),
                }
            }
        };

        self.register(link)
    }

    /// Join an existing group link by its id.
    pub fn join_by_id(&self, link_id: &str, name: &str) -> Result<Link, RegistryError> {
        let link_id = link_id.trim();
        if link_id.is_empty() {
            return Err(RegistryError::EmptyLinkId);
        }

        let name = if name.trim().is_empty() { link_id } else { name.trim() };
        self.register(Link {
            link_id: link_id.to_string(),
            name: name.to_string(),
            kind: LinkKind::Group,
            participants: BTreeSet::from([self.owner_id.clone()]),
            description: GROUP_DESCRIPTION.to_string(),
        })
    }

    /// Store a link proposed by a remote peer.
    pub fn accept_invite(&self, link: Link) -> Result<Link, RegistryError> {
        if link.link_id.trim().is_empty() {
            return Err(RegistryError::EmptyLinkId);
        }
        self.register(link)
    }

    /// Open the P2P link with `remote` and invite them into it.
    ///
    /// The link is named after the remote peer locally. The invite carries
    /// the same record named after us, which the remote side keeps unless it
    /// already created the link itself.
    pub fn quick_handshake(
        &self,
        local: &Identity,
        remote: &Identity,
        presence: &Presence,
    ) -> Result<Link, RegistryError> {
        if local.id == remote.id {
            return Err(RegistryError::InvalidP2PParticipants(1));
        }

        let link = self.create(
            LinkKind::P2P,
            &remote.display_name,
            [local.id.clone(), remote.id.clone()],
        )?;

        let mut offered = link.clone();
        offered.name = local.display_name.clone();
        presence.invite(&remote.id, &offered);

        info!(link = %link.link_id, peer = %remote.id, "Handshake sent");
        Ok(link)
    }

    pub fn get(&self, link_id: &str) -> Option<Link> {
        self.lock_links().get(link_id).cloned()
    }

    pub fn contains(&self, link_id: &str) -> bool {
        self.lock_links().contains_key(link_id)
    }

    /// All links, ordered by id.
    pub fn list(&self) -> Vec<Link> {
        self.lock_links().values().cloned().collect()
    }

    /// Relay rooms to subscribe to, one per link.
    pub fn room_ids(&self) -> Vec<String> {
        self.lock_links().keys().cloned().collect()
    }

    /// Forget a link and leave its room.
    pub fn remove(&self, link_id: &str) -> Result<Link, RegistryError> {
        let removed = {
            let mut links = self.lock_links();
            let removed = links
                .remove(link_id)
                .ok_or_else(|| RegistryError::NotFound(link_id.to_string()))?;
            self.persist_locked(&links);
            removed
        };

        self.channel.leave(link_id);
        info!(link = %link_id, "Link removed");
        Ok(removed)
    }

    /// Hydrate from the persistence port and subscribe to every stored
    /// link's room. Returns the number of links loaded.
    pub fn load_all(&self) -> usize {
        let stored: Vec<Link> = load_json(self.store.as_ref(), &links_key(&self.owner_id)).unwrap_or_default();

        let mut links = self.lock_links();
        for link in stored {
            if link.link_id == GLOBAL_SIGNALING_ROOM {
                warn!(owner = %self.owner_id, "Skipping stored link with reserved id");
                continue;
            }
            self.channel.join(&link.link_id);
            links.entry(link.link_id.clone()).or_insert(link);
        }

        debug!(count = links.len(), owner = %self.owner_id, "Links loaded");
        links.len()
    }

    /// Flush the full link set to the persistence port.
    pub fn persist_all(&self) {
        let links = self.lock_links();
        self.persist_locked(&links);
    }

    /// Insert `link` unless its id is taken. New links are persisted and
    /// their room is joined. The global signaling room is never a link.
    fn register(&self, link: Link) -> Result<Link, RegistryError> {
        if link.link_id == GLOBAL_SIGNALING_ROOM {
            return Err(RegistryError::ReservedLinkId(link.link_id));
        }

        let mut links = self.lock_links();
        if let Some(existing) = links.get(&link.link_id) {
            debug!(link = %link.link_id, "Link already registered");
            return Ok(existing.clone());
        }

        links.insert(link.link_id.clone(), link.clone());
        self.persist_locked(&links);
        drop(links);

        self.channel.join(&link.link_id);
        info!(link = %link.link_id, kind = ?link.kind, name = %link.name, "Link registered");
        Ok(link)
    }

    fn persist_locked(&self, links: &BTreeMap<String, Link>) {
        let snapshot: Vec<&Link> = links.values().collect();
        save_json(self.store.as_ref(), &links_key(&self.owner_id), &snapshot);
    }

    fn lock_links(&self) -> MutexGuard<'_, BTreeMap<String, Link>> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
