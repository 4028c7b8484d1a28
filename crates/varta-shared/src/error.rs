use thiserror::Error;

#[derive(Error, Debug)]
pub enum VartaError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed envelope: missing {0}")]
    MissingField(&'static str),
}
