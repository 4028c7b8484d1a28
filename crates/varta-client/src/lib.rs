//! # varta-client
//!
//! A Varta node: link registry, message archive and the command layer the
//! `varta` binary drives, on top of the relay channel and presence protocol
//! from `varta-net`.

pub mod archive;
pub mod commands;
pub mod config;
pub mod events;
pub mod node;
pub mod registry;
pub mod suggest;

mod error;

pub use archive::MessageArchive;
pub use config::ClientConfig;
pub use error::RegistryError;
pub use node::Node;
pub use registry::LinkRegistry;
pub use suggest::ReplySuggester;
