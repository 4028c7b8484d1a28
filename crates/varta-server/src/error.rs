use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Room {room} is full ({max} members)")]
    RoomFull { room: String, max: usize },

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] varta_shared::VartaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
