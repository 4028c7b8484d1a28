use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::IDENTITY_PREFIX;

/// A self-asserted peer identity.
///
/// Identities are generated locally on first boot and trusted as-is by
/// every other node. `last_seen` is only meaningful inside a directory: it
/// is the local receive time (Unix epoch millis) of the latest beacon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    #[serde(alias = "name")]
    pub display_name: String,
    #[serde(default, alias = "avatar")]
    pub avatar_ref: String,
    #[serde(default)]
    pub last_seen: i64,
}

impl Identity {
    /// Generate a new identity with a random `LIA-XXXXXX` id.
    pub fn generate(display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(|b| (b as char).to_ascii_uppercase())
            .collect();

        Self {
            id: format!("{IDENTITY_PREFIX}{suffix}"),
            avatar_ref: default_avatar(&display_name),
            display_name,
            last_seen: 0,
        }
    }

    /// Build an identity with a known id (used when restoring or in tests).
    pub fn with_id(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        Self {
            id: id.into(),
            avatar_ref: default_avatar(&display_name),
            display_name,
            last_seen: 0,
        }
    }
}

fn default_avatar(seed: &str) -> String {
    format!("https://api.dicebear.com/7.x/bottts/svg?seed={seed}")
}
