//! Error types produced by the message codec and header-value parsers.

use thiserror::Error;

/// Errors raised while parsing SIP wire data or header mini-syntaxes.
#[derive(Debug, Error)]
pub enum Error {
    /// The start line or header block did not conform to CRLF framing.
    #[error("sip: bad message")]
    BadMessage,

    /// A URI, User, or Via value did not match its expected grammar.
    #[error("sip: parse error")]
    ParseError,

    /// The underlying transport failed while a message was being read or written.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
