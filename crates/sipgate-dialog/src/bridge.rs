//! Bridges an INVITE dialog between two registered peers: reject unless the
//! caller is registered on the connection it's calling from and the callee
//! is known, then forward traffic verbatim in both directions until either
//! side hangs up.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use sipgate_core::{codec, ConnMessage, Request, Response};
use sipgate_registrar::RegisteredUsers;
use sipgate_transport::Connection;

use crate::error::Result;

const OPTIONS_ALLOW: &str = "INVITE, ACK, CANCEL, OPTIONS, BYE";
const RETRANSMIT_ATTEMPTS: usize = 10;
const RETRANSMIT_INTERVAL: Duration = Duration::from_millis(500);

/// Runs the full INVITE flow for `request`, arrived on `caller` from the
/// peer registered in `registered`.
pub async fn handle_invite(request: &Request, caller: &Connection, registered: &RegisteredUsers) -> Result<()> {
    let (to_result, from_result) = sipgate_core::parse_user_header(&request.headers);
    let (to, from) = match (to_result, from_result) {
        (Ok(to), Ok(from)) => (to, from),
        _ => return reject(request, caller, 400, "Failed to parse From or To header.").await,
    };

    let caller_username = from.uri.username.clone();
    match registered.get(&caller_username) {
        Some(bound) if bound.remote_addr() == caller.remote_addr() => {}
        _ => return reject(request, caller, 403, "Not registered.").await,
    }

    let callee_username = to.uri.username.clone();
    let callee = match registered.get(&callee_username) {
        Some(conn) => conn,
        None => return reject(request, caller, 404, "").await,
    };

    caller.lock().await;
    callee.lock().await;

    info!(caller = %caller_username, callee = %callee_username, "bridging invite");

    let outcome = bridge(request, caller, &callee).await;

    caller.unlock().await;
    callee.unlock().await;

    outcome
}

async fn reject(request: &Request, connection: &Connection, status: u16, reason: &str) -> Result<()> {
    let mut response = reply_base(request, connection, status);
    if !reason.is_empty() {
        response.headers.set("Reason-Phrase", reason);
    }
    connection.send_response(&response).await?;
    Ok(())
}

fn reply_base(request: &Request, connection: &Connection, status: u16) -> Response {
    let addr = connection.remote_addr();
    codec::reply_to(request, status, &addr.ip().to_string(), addr.port())
}

/// Sends `100 Trying` to the caller, forwards the INVITE to the callee, and
/// runs the two forwarders to completion.
async fn bridge(initial_request: &Request, caller: &Connection, callee: &Connection) -> Result<()> {
    let trying = reply_base(initial_request, caller, 100);
    caller.send_response(&trying).await?;
    callee.send_request(initial_request).await?;

    let to_callee = forward_caller_to_callee(caller.clone(), callee.clone());
    let to_caller = forward_callee_to_caller(initial_request.clone(), callee.clone(), caller.clone());

    tokio::join!(to_callee, to_caller);
    Ok(())
}

/// caller -> callee: every Request is forwarded and remembered; a Response
/// is stamped against the most recently forwarded Request from this same
/// direction.
async fn forward_caller_to_callee(caller: Connection, callee: Connection) {
    let mut last_request: Option<Request> = None;
    loop {
        match caller.read_typed().await {
            ConnMessage::Request(req) => {
                if callee.send_request(&req).await.is_err() {
                    return;
                }
                last_request = Some(req);
            }
            ConnMessage::Response(resp) => {
                let Some(req) = &last_request else {
                    warn!("dropping response with no matching forwarded request");
                    continue;
                };
                if let Err(e) = send_stamped_response(&callee, resp, req).await {
                    warn!(error = %e, "failed forwarding response to callee");
                    return;
                }
            }
            ConnMessage::Error(e) => {
                info!(error = %e, "caller side of bridge ended");
                return;
            }
        }
    }
}

/// callee -> caller: symmetric to the above, except OPTIONS is answered
/// directly to the callee and `100 Trying` is swallowed (the caller already
/// got one when the bridge set up).
async fn forward_callee_to_caller(initial_request: Request, callee: Connection, caller: Connection) {
    let mut last_request = initial_request.clone();
    loop {
        match callee.read_typed().await {
            ConnMessage::Request(req) if req.method == sipgate_core::Method::Options => {
                let response = options_pong(&req, &callee, &initial_request);
                if let Err(e) = callee.send_response(&response).await {
                    warn!(error = %e, "failed answering options from callee");
                    return;
                }
            }
            ConnMessage::Request(req) => {
                if caller.send_request(&req).await.is_err() {
                    return;
                }
                last_request = req;
            }
            ConnMessage::Response(resp) if resp.status_code == 100 => {
                // The bridge already sent its own 100 Trying to the caller.
            }
            ConnMessage::Response(resp) => {
                if let Err(e) = send_stamped_response(&caller, resp, &last_request).await {
                    warn!(error = %e, "failed forwarding response to caller");
                    return;
                }
            }
            ConnMessage::Error(e) => {
                info!(error = %e, "callee side of bridge ended");
                return;
            }
        }
    }
}

async fn send_stamped_response(to: &Connection, response: Response, matching_request: &Request) -> Result<()> {
    let addr = to.remote_addr();
    let stamped = codec::stamp_response_for_request(response, matching_request, &addr.ip().to_string(), addr.port());
    to.send_response(&stamped).await?;
    Ok(())
}

fn options_pong(options_request: &Request, connection: &Connection, initial_request: &Request) -> Response {
    let addr = connection.remote_addr();
    let mut response = codec::reply_to(options_request, 200, &addr.ip().to_string(), addr.port());
    response.headers.set("Allow", OPTIONS_ALLOW);
    response.headers.set("Accept", "application/sdp");
    response.headers.set("Accept-Encoding", "gzip");
    response.headers.set("Accept-Language", "en");
    response.headers.set("Content-Type", "application/sdp");
    response.body = initial_request.body.clone();
    response
}

/// Sends `request` to `to` up to 10 times, 500ms apart, returning the first
/// Response read on `to`. Requests received from `to` while waiting (e.g. a
/// keep-alive OPTIONS) are auto-answered the same way the bridge answers
/// OPTIONS, and retransmission continues. Not used by the steady-state
/// bridge; kept for callers (CANCEL/BYE-style one-shot sends) that need
/// delivery confidence over UDP.
pub async fn send_unreliable(request: &Request, from: &Connection, to: &Connection) -> Result<Response> {
    for attempt in 1..=RETRANSMIT_ATTEMPTS {
        to.send_request(request).await?;
        match timeout(RETRANSMIT_INTERVAL, to.read_typed()).await {
            Ok(ConnMessage::Response(resp)) => return Ok(resp),
            Ok(ConnMessage::Request(req)) if req.method == sipgate_core::Method::Options => {
                let response = options_pong(&req, from, request);
                from.send_response(&response).await?;
            }
            Ok(ConnMessage::Request(_)) => {
                // Non-OPTIONS traffic while waiting; ignore and keep retransmitting.
            }
            Ok(ConnMessage::Error(e)) => return Err(e.into()),
            Err(_) => {}
        }
        if attempt == RETRANSMIT_ATTEMPTS {
            break;
        }
    }
    Err(sipgate_transport::Error::Closed.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    use sipgate_core::codec::{self as core_codec, Decoded};
    use sipgate_core::Method;

    async fn connected_pair() -> (Connection, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server_stream, peer) = listener.accept().await.unwrap();
        let server_conn = Connection::from_tcp_stream(server_stream, peer);
        (server_conn, client, addr)
    }

    async fn recv_message(client: &mut TcpStream) -> ConnMessage {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 2048];
        loop {
            if let Decoded::Message { message, .. } = core_codec::decode(&buf) {
                return message;
            }
            let n = timeout(Duration::from_secs(2), client.read(&mut chunk))
                .await
                .expect("timed out waiting for message")
                .unwrap();
            assert!(n > 0, "peer closed before a full message arrived");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn invite_request() -> Request {
        let mut req = Request::new(Method::Invite, "sip:bob@realm");
        req.headers.set("Call-ID", "call-invite");
        req.headers.set("Via", "SIP/2.0/TCP alice-host;branch=z9hG4bKinvite1");
        req.headers.set("From", "Alice <sip:alice@realm>;tag=atag");
        req.headers.set("To", "Bob <sip:bob@realm>");
        req.body = b"v=0\r\no=alice".to_vec();
        req
    }

    #[tokio::test]
    async fn unregistered_caller_gets_forbidden() {
        let (caller_conn, mut caller_client, _addr) = connected_pair().await;
        let registered = RegisteredUsers::new();

        handle_invite(&invite_request(), &caller_conn, &registered).await.unwrap();

        match recv_message(&mut caller_client).await {
            ConnMessage::Response(r) => {
                assert_eq!(r.status_code, 403);
                assert_eq!(r.headers.get("Reason-Phrase"), "Not registered.");
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_callee_gets_not_found() {
        let (caller_conn, mut caller_client, _addr) = connected_pair().await;
        let registered = RegisteredUsers::new();
        registered.register("alice", caller_conn.clone()).await;

        handle_invite(&invite_request(), &caller_conn, &registered).await.unwrap();

        match recv_message(&mut caller_client).await {
            ConnMessage::Response(r) => assert_eq!(r.status_code, 404),
            other => panic!("expected response, got {other:?}"),
        }
    }
}
