//! Typed JSON documents on top of a [`KeyValueStore`].
//!
//! Persistence is fail-soft for callers: an unreadable or corrupt document
//! reads as "no prior state" and a failed write is logged and skipped. The
//! `try_*` variants surface the underlying error for callers that care.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::kv::KeyValueStore;

pub fn try_load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn try_save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// Load the document at `key`, treating any failure as absent.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    match try_load_json(store, key) {
        Ok(value) => value,
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to load stored document, starting empty");
            None
        }
    }
}

/// Overwrite the document at `key`. Failures are logged and swallowed.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) {
    if let Err(e) = try_save_json(store, key, value) {
        warn!(key = %key, error = %e, "Failed to persist document");
    }
}
