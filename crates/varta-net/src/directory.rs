//! Live-node directory.
//!
//! Maps identity ids to the latest identity record announced by that peer.
//! Entries are never evicted: a peer that stops beaconing simply ages out of
//! the live view once its `last_seen` is older than the liveness window.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use varta_shared::identity::Identity;

#[derive(Debug, Clone)]
pub struct Directory {
    entries: HashMap<String, Identity>,
    window_ms: i64,
}

impl Directory {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            window_ms: window.as_millis() as i64,
        }
    }

    /// Record `identity` as seen at `now_ms`, superseding any earlier entry.
    pub fn observe(&mut self, mut identity: Identity, now_ms: i64) {
        identity.last_seen = now_ms;
        debug!(peer = %identity.id, name = %identity.display_name, "Directory updated");
        self.entries.insert(identity.id.clone(), identity);
    }

    pub fn get(&self, id: &str) -> Option<&Identity> {
        self.entries.get(id)
    }

    /// Whether `id` has been seen within the liveness window.
    pub fn is_live(&self, id: &str, now_ms: i64) -> bool {
        self.entries
            .get(id)
            .is_some_and(|identity| now_ms - identity.last_seen <= self.window_ms)
    }

    /// Identities seen within the liveness window, ordered by id.
    pub fn live_nodes(&self, now_ms: i64) -> Vec<Identity> {
        let mut live: Vec<Identity> = self
            .entries
            .values()
            .filter(|identity| now_ms - identity.last_seen <= self.window_ms)
            .cloned()
            .collect();
        live.sort_by(|a, b| a.id.cmp(&b.id));
        live
    }

    /// Every entry, live or stale, ordered by id.
    pub fn all(&self) -> Vec<Identity> {
        let mut all: Vec<Identity> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
