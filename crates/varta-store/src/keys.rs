//! Document keys. One session document per device, link and archive
//! documents per identity.

use varta_shared::constants::{ARCHIVE_KEY_PREFIX, LINKS_KEY_PREFIX, SESSION_KEY};

pub fn session_key() -> &'static str {
    SESSION_KEY
}

pub fn links_key(identity_id: &str) -> String {
    format!("{LINKS_KEY_PREFIX}{identity_id}")
}

pub fn archive_key(identity_id: &str) -> String {
    format!("{ARCHIVE_KEY_PREFIX}{identity_id}")
}
