//! SIP User: an optional display name, a URI, and trailing arguments.
//! Appears in `To`/`From`/`Contact`-shaped header values.

use crate::error::Result;
use crate::header_args::{parse_header_args, HeaderArgs};
use crate::header::Header;
use crate::uri::Uri;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub uri: Uri,
    pub arguments: HeaderArgs,
}

impl User {
    /// Parses either a bare URI, or `[display]<URI>[;args]`.
    pub fn parse(s: &str) -> Result<User> {
        if let Some(lt) = s.find('<') {
            if let Some(gt_rel) = s[lt + 1..].find('>') {
                let gt = lt + 1 + gt_rel;
                let name = s[..lt].trim().to_string();
                let uri = Uri::parse(s[lt + 1..gt].trim())?;
                let arguments = parse_header_args(s[gt + 1..].trim());
                return Ok(User { name, uri, arguments });
            }
        }

        let uri = Uri::parse(s)?;
        Ok(User {
            name: String::new(),
            uri,
            arguments: HeaderArgs::new(),
        })
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "<{}>{}", self.uri, self.arguments.semicolon_string())
        } else {
            write!(f, "{} <{}>{}", self.name, self.uri, self.arguments.semicolon_string())
        }
    }
}

/// Extracts the `To` and `From` header values as parsed Users. An error
/// parsing either field is returned; both fields are attempted regardless of
/// which one fails first.
pub fn parse_user_header(h: &Header) -> (Result<User>, Result<User>) {
    let to = User::parse(h.get("To"));
    let from = User::parse(h.get("From"));
    (to, from)
}
