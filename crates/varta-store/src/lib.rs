//! # varta-store
//!
//! Local persistence for Varta nodes.
//!
//! Everything a node remembers (its identity, its links and its message
//! archive) is stored as JSON documents under string keys. The
//! [`KeyValueStore`] trait is the port the rest of the application talks
//! to; [`Database`] implements it on top of SQLite and [`MemoryStore`]
//! keeps everything in process memory.

pub mod database;
pub mod json;
pub mod keys;
pub mod kv;
pub mod memory;
pub mod migrations;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use json::{load_json, save_json, try_load_json, try_save_json};
pub use kv::KeyValueStore;
pub use memory::MemoryStore;
