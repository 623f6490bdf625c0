//! SIP Via: `"SIP"/version/transport client[;args]`.

use crate::error::{Error, Result};
use crate::header_args::{parse_header_args, HeaderArgs};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Via {
    pub sip_version: String,
    pub transport: String,
    pub client: String,
    pub arguments: HeaderArgs,
}

impl Via {
    pub fn parse(s: &str) -> Result<Via> {
        if !s.starts_with("SIP/") {
            return Err(Error::ParseError);
        }

        let after_sip = &s[4..];
        let slash = after_sip.find('/').ok_or(Error::ParseError)?;
        let sip_version = format!("SIP/{}", &after_sip[..slash]);

        let after_ver = &after_sip[slash + 1..];
        let space = after_ver.find(' ').ok_or(Error::ParseError)?;
        let transport = after_ver[..space].to_string();

        let rest = &after_ver[space + 1..];
        let (client, tail) = match rest.find(';') {
            Some(idx) => (rest[..idx].trim().to_string(), &rest[idx..]),
            None => (rest.trim().to_string(), ""),
        };

        if client.is_empty() || transport.is_empty() {
            return Err(Error::ParseError);
        }

        let arguments = parse_header_args(tail);

        Ok(Via {
            sip_version,
            transport,
            client,
            arguments,
        })
    }
}

impl std::fmt::Display for Via {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} {}{}",
            self.sip_version,
            self.transport,
            self.client,
            self.arguments.semicolon_string()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_via_with_branch() {
        let via = Via::parse("SIP/2.0/UDP pc33.example.com;branch=z9hG4bK776a").unwrap();
        assert_eq!(via.sip_version, "SIP/2.0");
        assert_eq!(via.transport, "UDP");
        assert_eq!(via.client, "pc33.example.com");
        assert_eq!(via.arguments.get("branch"), "z9hG4bK776a");
    }

    #[test]
    fn parses_via_without_arguments() {
        let via = Via::parse("SIP/2.0/TCP host:5060").unwrap();
        assert_eq!(via.client, "host:5060");
        assert!(via.arguments.is_empty());
    }

    #[test]
    fn rejects_non_sip_prefix() {
        assert!(Via::parse("UDP/2.0/UDP host").is_err());
    }

    #[test]
    fn round_trips_branch() {
        let original = Via::parse("SIP/2.0/UDP host;branch=z9hG4bKabc;rport").unwrap();
        let rendered = original.to_string();
        let reparsed = Via::parse(&rendered).unwrap();
        assert_eq!(reparsed.client, "host");
        assert_eq!(reparsed.arguments.get("branch"), "z9hG4bKabc");
        assert!(reparsed.arguments.contains("rport"));
    }
}
