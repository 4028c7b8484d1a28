use thiserror::Error;

/// Errors returned by link registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A P2P link was requested with the wrong number of participants.
    #[error("P2P link needs exactly two distinct participants, got {0}")]
    InvalidP2PParticipants(usize),

    /// A link id was empty.
    #[error("Link id must not be empty")]
    EmptyLinkId,

    /// The id belongs to the global signaling room.
    #[error("Link id {0} is reserved")]
    ReservedLinkId(String),

    /// No link with this id is registered.
    #[error("Unknown link: {0}")]
    NotFound(String),
}
