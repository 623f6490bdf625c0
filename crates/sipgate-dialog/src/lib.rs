//! The INVITE dialog bridge: registration/lookup checks, then bidirectional
//! forwarding between two Connections for the life of a call.

pub mod bridge;
pub mod error;

pub use bridge::{handle_invite, send_unreliable};
pub use error::{Error, Result};
