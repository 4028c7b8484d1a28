//! Command handlers.
//!
//! Each sub-module groups related user intents by domain. Commands take the
//! [`Node`](crate::node::Node) (or the store, for identity onboarding),
//! return serializable DTOs and report failures as display strings.

pub mod identity;
pub mod links;
pub mod messaging;
pub mod network;
