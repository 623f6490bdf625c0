//! Errors the registrar reports to its caller; never shown to the peer
//! directly (the REGISTER handler maps these onto a status code/reason).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Message(#[from] sipgate_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] sipgate_transport::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
