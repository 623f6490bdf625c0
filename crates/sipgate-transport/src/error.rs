//! Transport-level errors: connection lifecycle and listener setup failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("sip: closed pipe")]
    Closed,

    #[error("sip: invalid branch")]
    InvalidBranch,

    #[error("sip: missing branch")]
    MissingBranch,

    #[error(transparent)]
    Message(#[from] sipgate_core::Error),

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
