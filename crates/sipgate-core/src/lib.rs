//! Message framing, header-value parsers, and the status-code table shared
//! by every other `sipgate-*` crate.

pub mod codec;
pub mod error;
pub mod header;
pub mod header_args;
pub mod message;
pub mod status;
pub mod uri;
pub mod user;
pub mod via;

pub use codec::{decode, encode_request, encode_response, reply_to, stamp_response_for_request, Decoded};
pub use error::{Error, Result};
pub use header::Header;
pub use header_args::HeaderArgs;
pub use message::{ConnMessage, Method, Request, Response, SIP_VERSION};
pub use status::reason_phrase;
pub use uri::Uri;
pub use user::{parse_user_header, User};
pub use via::Via;
