//! Types and wire protocol shared by every Varta crate.

pub mod constants;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod types;

pub use error::VartaError;
pub use identity::Identity;
pub use types::{now_millis, AssetKind, Link, LinkKind, Pulse};
