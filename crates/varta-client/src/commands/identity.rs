use serde::Serialize;
use tracing::info;

use varta_shared::Identity;
use varta_store::keys::session_key;
use varta_store::{load_json, try_save_json, KeyValueStore};

use crate::node::Node;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDto {
    pub id: String,
    pub display_name: String,
    pub avatar_ref: String,
}

impl From<&Identity> for IdentityDto {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            display_name: identity.display_name.clone(),
            avatar_ref: identity.avatar_ref.clone(),
        }
    }
}

/// Load the persisted session identity, if any.
pub fn load_identity(store: &dyn KeyValueStore) -> Option<Identity> {
    load_json(store, session_key())
}

/// Create and persist a fresh identity for `display_name`.
pub fn onboard(store: &dyn KeyValueStore, display_name: &str) -> Result<Identity, String> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err("Display name must not be empty".into());
    }

    let identity = Identity::generate(display_name);
    try_save_json(store, session_key(), &identity)
        .map_err(|e| format!("Failed to save identity: {e}"))?;

    info!(id = %identity.id, name = %identity.display_name, "Created new identity");
    Ok(identity)
}

pub fn whoami(node: &Node) -> IdentityDto {
    IdentityDto::from(node.identity())
}

/// Forget the session identity. Links and archives stay on disk under the
/// old identity's keys.
pub fn logout(store: &dyn KeyValueStore) -> Result<(), String> {
    store
        .remove(session_key())
        .map(|_| ())
        .map_err(|e| format!("Failed to clear session: {e}"))
}
