//! Error type for the dialog bridge.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sip message error: {0}")]
    Message(#[from] sipgate_core::Error),
    #[error("transport error: {0}")]
    Transport(#[from] sipgate_transport::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
