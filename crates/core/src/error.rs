use thiserror::Error;

use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything `submit` and the gate can hand back to a caller.
///
/// Variants before `Transport` never consume an admission; `Transport` and
/// `Disconnected` are reported after the request was already counted.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("document could not be serialized: {0}")]
    Serialization(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("credential cannot be attached to the request: {0}")]
    Signing(String),

    #[error("rate gate is closed")]
    Closed,

    #[error("timed out waiting for rate gate capacity")]
    TimedOut,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("send worker dropped the response")]
    Disconnected,
}

impl Error {
    /// True when the failure happened after the gate admitted the request.
    pub fn consumed_admission(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Disconnected)
    }
}
