//! CRLF-framed message codec: decode a byte buffer into a [`ConnMessage`],
//! encode a [`Request`] or [`Response`] back into bytes.

use crate::error::Error;
use crate::header::Header;
use crate::message::{ConnMessage, Method, Request, Response, SIP_VERSION};
use crate::via::Via;

/// Outcome of attempting to decode one message from the front of `buf`.
pub enum Decoded {
    /// Not enough bytes yet to frame a full message (TCP streams only;
    /// callers should read more and retry).
    Incomplete,
    /// A message (possibly a framing error) was produced, having consumed
    /// `consumed` bytes from the front of the buffer.
    Message { message: ConnMessage, consumed: usize },
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Attempts to decode one full message from the start of `buf`.
pub fn decode(buf: &[u8]) -> Decoded {
    let header_block_end = match find(buf, b"\r\n\r\n") {
        Some(i) => i,
        None => return Decoded::Incomplete,
    };
    let head = &buf[..header_block_end];

    let line_end = match find(head, b"\r\n") {
        Some(i) => i,
        None => {
            return Decoded::Message {
                message: ConnMessage::Error(Error::BadMessage),
                consumed: header_block_end + 4,
            }
        }
    };

    let start_line = match std::str::from_utf8(&head[..line_end]) {
        Ok(s) => s,
        Err(_) => {
            return Decoded::Message {
                message: ConnMessage::Error(Error::BadMessage),
                consumed: header_block_end + 4,
            }
        }
    };

    let headers = match parse_header_block(&head[line_end + 2..]) {
        Ok(h) => h,
        Err(e) => {
            return Decoded::Message {
                message: ConnMessage::Error(e),
                consumed: header_block_end + 4,
            }
        }
    };

    let content_length: usize = headers.get("Content-Length").trim().parse().unwrap_or(0);
    let body_start = header_block_end + 4;
    if buf.len() < body_start + content_length {
        return Decoded::Incomplete;
    }
    let body = buf[body_start..body_start + content_length].to_vec();
    let consumed = body_start + content_length;

    let message = match parse_start_line(start_line, headers, body) {
        Ok(m) => m,
        Err(e) => ConnMessage::Error(e),
    };

    Decoded::Message { message, consumed }
}

fn parse_header_block(block: &[u8]) -> Result<Header, Error> {
    let text = std::str::from_utf8(block).map_err(|_| Error::BadMessage)?;
    let mut headers = Header::new();
    if text.is_empty() {
        return Ok(headers);
    }
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let colon = line.find(':').ok_or(Error::BadMessage)?;
        let key = line[..colon].trim();
        let value = line[colon + 1..].trim();
        if key.is_empty() {
            return Err(Error::BadMessage);
        }
        headers.set(key, value);
    }
    Ok(headers)
}

fn parse_start_line(line: &str, headers: Header, body: Vec<u8>) -> Result<ConnMessage, Error> {
    let mut parts = line.splitn(3, ' ');
    let first = parts.next().ok_or(Error::BadMessage)?;
    let second = parts.next().ok_or(Error::BadMessage)?;
    let third = parts.next().ok_or(Error::BadMessage)?;

    if first.starts_with("SIP/") {
        let status_code: u16 = second.parse().map_err(|_| Error::BadMessage)?;
        Ok(ConnMessage::Response(Response {
            status_code,
            reason: third.to_string(),
            version: first.to_string(),
            headers,
            body,
        }))
    } else {
        Ok(ConnMessage::Request(Request {
            method: Method::from(first),
            request_uri: second.to_string(),
            version: third.to_string(),
            headers,
            body,
        }))
    }
}

/// Encodes `req`, unconditionally overwriting `Content-Length`.
pub fn encode_request(req: &Request) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(
        format!("{} {} {}\r\n", req.method.as_str(), req.request_uri, req.version).as_bytes(),
    );
    let mut headers = req.headers.clone();
    headers.set("Content-Length", req.body.len().to_string());
    headers.write_to(&mut out);
    out.extend_from_slice(&req.body);
    out
}

/// Encodes `resp`, unconditionally overwriting `Content-Length`.
pub fn encode_response(resp: &Response) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(
        format!("{} {} {}\r\n", resp.version, resp.status_code, resp.reason).as_bytes(),
    );
    let mut headers = resp.headers.clone();
    headers.set("Content-Length", resp.body.len().to_string());
    headers.write_to(&mut out);
    out.extend_from_slice(&resp.body);
    out
}

/// Stamps the auto-headers a Response must carry when sent in reply to
/// `request`: `CSeq`, `Call-ID` copied verbatim, and `Via` copied with
/// `received`/`rport` appended for the peer the request arrived from.
pub fn stamp_response_for_request(
    mut response: Response,
    request: &Request,
    peer_ip: &str,
    peer_port: u16,
) -> Response {
    response.headers.set("CSeq", request.headers.get("CSeq"));
    response.headers.set("Call-ID", request.headers.get("Call-ID"));

    let via_value = request.headers.get("Via");
    if let Ok(mut via) = Via::parse(via_value) {
        via.arguments.set("received", peer_ip);
        via.arguments.set("rport", peer_port.to_string());
        response.headers.set("Via", via.to_string());
    } else if !via_value.is_empty() {
        response.headers.set("Via", via_value);
    }

    response
}

/// Builds a `Response` to `request` with the status's default reason,
/// stamped with the request's `CSeq`/`Call-ID`/`Via` as above.
pub fn reply_to(request: &Request, status_code: u16, peer_ip: &str, peer_port: u16) -> Response {
    stamp_response_for_request(Response::new(status_code), request, peer_ip, peer_port)
}

pub fn sip_version() -> &'static str {
    SIP_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request_bytes() -> Vec<u8> {
        b"REGISTER sip:realm SIP/2.0\r\nCall-ID: abc\r\nVia: SIP/2.0/UDP h;branch=z9hG4bK1\r\n\r\n"
            .to_vec()
    }

    #[test]
    fn decodes_request_without_body() {
        let buf = sample_request_bytes();
        match decode(&buf) {
            Decoded::Message { message, consumed } => {
                assert_eq!(consumed, buf.len());
                match message {
                    ConnMessage::Request(r) => {
                        assert_eq!(r.method, Method::Register);
                        assert_eq!(r.request_uri, "sip:realm");
                        assert_eq!(r.headers.get("Call-ID"), "abc");
                    }
                    _ => panic!("expected request"),
                }
            }
            Decoded::Incomplete => panic!("expected complete message"),
        }
    }

    #[test]
    fn incomplete_when_body_not_fully_buffered() {
        let mut buf = b"SIP/2.0 200 OK\r\nContent-Length: 5\r\n\r\nhel".to_vec();
        assert!(matches!(decode(&buf), Decoded::Incomplete));
        buf.extend_from_slice(b"lo");
        match decode(&buf) {
            Decoded::Message { message, consumed } => {
                assert_eq!(consumed, buf.len());
                match message {
                    ConnMessage::Response(r) => assert_eq!(r.body, b"hello"),
                    _ => panic!("expected response"),
                }
            }
            Decoded::Incomplete => panic!("expected complete message"),
        }
    }

    #[test]
    fn bad_header_line_yields_error_message() {
        let buf = b"REGISTER sip:realm SIP/2.0\r\nnotaheader\r\n\r\n".to_vec();
        match decode(&buf) {
            Decoded::Message { message, .. } => {
                assert!(matches!(message, ConnMessage::Error(Error::BadMessage)));
            }
            Decoded::Incomplete => panic!("expected a (error) message"),
        }
    }

    #[test]
    fn encode_overrides_content_length() {
        let mut req = Request::new(Method::Options, "sip:bob@realm");
        req.headers.set("Content-Length", "999");
        let bytes = encode_request(&req);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Content-Length: 0"));
        assert!(!text.contains("999"));
    }

    #[test]
    fn stamp_response_copies_fields_and_augments_via() {
        let mut req = Request::new(Method::Register, "sip:realm");
        req.headers.set("CSeq", "1 REGISTER");
        req.headers.set("Call-ID", "abc");
        req.headers.set("Via", "SIP/2.0/UDP h;branch=z9hG4bK12345678");

        let resp = reply_to(&req, 401, "203.0.113.5", 5060);
        assert_eq!(resp.headers.get("CSeq"), "1 REGISTER");
        assert_eq!(resp.headers.get("Call-ID"), "abc");
        let via = Via::parse(resp.headers.get("Via")).unwrap();
        assert_eq!(via.arguments.get("received"), "203.0.113.5");
        assert_eq!(via.arguments.get("rport"), "5060");
        assert_eq!(resp.reason, "Unauthorized");
    }

    #[test]
    fn round_trip_request_through_wire() {
        let mut req = Request::new(Method::Invite, "sip:bob@realm");
        req.headers.set("Call-ID", "xyz");
        req.body = b"v=0".to_vec();
        let bytes = encode_request(&req);
        match decode(&bytes) {
            Decoded::Message { message, consumed } => {
                assert_eq!(consumed, bytes.len());
                match message {
                    ConnMessage::Request(r) => {
                        assert_eq!(r.method, Method::Invite);
                        assert_eq!(r.body, b"v=0");
                        assert_eq!(r.headers.get("Call-ID"), "xyz");
                    }
                    _ => panic!("expected request"),
                }
            }
            Decoded::Incomplete => panic!("expected complete message"),
        }
    }
}
