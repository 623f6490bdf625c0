//! REGISTER authentication and the registered-user table.

pub mod account;
pub mod auth_session;
pub mod digest;
pub mod error;
pub mod registered;
pub mod registrar;

pub use account::Accounts;
pub use auth_session::{AuthSession, AuthSessions};
pub use error::{Error, Result};
pub use registered::RegisteredUsers;
pub use registrar::Registrar;
