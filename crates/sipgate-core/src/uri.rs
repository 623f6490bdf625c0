//! SIP URI: `scheme:username@domain(;args)*`.

use crate::error::{Error, Result};
use crate::header_args::{parse_header_args, HeaderArgs};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: String,
    pub username: String,
    pub domain: String,
    pub arguments: HeaderArgs,
}

impl Uri {
    /// Parses `scheme:username@domain` optionally followed by `;key=value` args.
    pub fn parse(s: &str) -> Result<Uri> {
        let colon = s.find(':').ok_or(Error::ParseError)?;
        let scheme = &s[..colon];
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::ParseError);
        }

        let rest = &s[colon + 1..];
        let at = rest.find('@').ok_or(Error::ParseError)?;
        let username = &rest[..at];

        let after_at = &rest[at + 1..];
        let domain_end = after_at
            .find(|c: char| c.is_whitespace() || c == ';')
            .unwrap_or(after_at.len());
        if domain_end == 0 {
            return Err(Error::ParseError);
        }
        let domain = &after_at[..domain_end];
        let tail = &after_at[domain_end..];

        let arguments = if tail.starts_with(';') {
            parse_header_args(tail)
        } else {
            HeaderArgs::new()
        };

        Ok(Uri {
            scheme: scheme.to_string(),
            username: username.to_string(),
            domain: domain.to_string(),
            arguments,
        })
    }

    /// `scheme:username@domain`, without arguments.
    pub fn scheme_user_domain(&self) -> String {
        format!("{}:{}", self.scheme, self.user_domain())
    }

    /// `username@domain`.
    pub fn user_domain(&self) -> String {
        format!("{}@{}", self.username, self.domain)
    }
}

impl std::fmt::Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.scheme_user_domain(), self.arguments.semicolon_string())
    }
}
