//! Request/Response message types, the dispatcher's unit of work.

use crate::header::Header;
use crate::status::reason_phrase;

pub const SIP_VERSION: &str = "SIP/2.0";

/// A SIP request method. Recognised methods get their own variant so
/// dispatch can match on them; anything else round-trips through `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Register,
    Options,
    Info,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Register => "REGISTER",
            Method::Options => "OPTIONS",
            Method::Info => "INFO",
            Method::Other(s) => s,
        }
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s {
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "REGISTER" => Method::Register,
            "OPTIONS" => Method::Options,
            "INFO" => Method::Info,
            other => Method::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub request_uri: String,
    pub version: String,
    pub headers: Header,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, request_uri: impl Into<String>) -> Self {
        Request {
            method,
            request_uri: request_uri.into(),
            version: SIP_VERSION.to_string(),
            headers: Header::new(),
            body: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub reason: String,
    pub version: String,
    pub headers: Header,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status_code: u16) -> Self {
        Response {
            status_code,
            reason: reason_phrase(status_code).to_string(),
            version: SIP_VERSION.to_string(),
            headers: Header::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(status_code: u16, body: Vec<u8>) -> Self {
        let mut r = Response::new(status_code);
        r.body = body;
        r
    }
}

/// What a framer produced for one inbound unit: a parsed Request, a parsed
/// Response, or a framing error. Consumers branch on this tag.
#[derive(Debug)]
pub enum ConnMessage {
    Request(Request),
    Response(Response),
    Error(crate::error::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trips_known_variants() {
        for (s, m) in [
            ("INVITE", Method::Invite),
            ("BYE", Method::Bye),
            ("REGISTER", Method::Register),
        ] {
            assert_eq!(Method::from(s), m);
            assert_eq!(m.as_str(), s);
        }
    }

    #[test]
    fn unknown_method_round_trips_as_other() {
        let m = Method::from("SUBSCRIBE");
        assert_eq!(m, Method::Other("SUBSCRIBE".to_string()));
        assert_eq!(m.to_string(), "SUBSCRIBE");
    }

    #[test]
    fn response_new_fills_in_reason() {
        let r = Response::new(404);
        assert_eq!(r.reason, "Not Found");
        assert_eq!(r.version, SIP_VERSION);
    }
}
