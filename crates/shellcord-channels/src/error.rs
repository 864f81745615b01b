//! Error types for shellcord-channels

use thiserror::Error;

/// Channel error type
#[derive(Debug, Error)]
pub enum Error {
    /// Discord API or gateway error
    #[error("discord error: {0}")]
    Discord(String),

    /// Identifier or payload parsing error
    #[error("parse error: {0}")]
    Parse(String),

    /// Error raised by the session engine
    #[error(transparent)]
    Engine(#[from] shellcord_core::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for shellcord_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Engine(inner) => inner,
            other => shellcord_core::Error::Display(other.to_string()),
        }
    }
}
