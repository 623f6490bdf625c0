//! Exercises the listener and connection over real loopback sockets, never
//! a mocked transport.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use sipgate_core::{ConnMessage, Method, Request};
use sipgate_transport::{dial_tcp, DispatchItem, Listener};

fn register_request(call_id: &str, branch: &str) -> Request {
    let mut req = Request::new(Method::Register, "sip:realm");
    req.headers.set("Call-ID", call_id);
    req.headers.set("Via", &format!("SIP/2.0/UDP 127.0.0.1;branch={branch}"));
    req.headers.set("From", "Alice <sip:alice@realm>");
    req.headers.set("To", "Alice <sip:alice@realm>");
    req
}

async fn bind_loopback_listener() -> (Listener, SocketAddr) {
    let listener = Listener::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[tokio::test]
async fn udp_request_round_trip_through_listener() {
    let (listener, addr) = bind_loopback_listener().await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(addr).await.unwrap();

    let req = register_request("call-1", "z9hG4bKudp0001");
    let bytes = sipgate_core::encode_request(&req);
    client.send(&bytes).await.unwrap();

    let item = tokio::time::timeout(Duration::from_secs(2), listener.accept_request())
        .await
        .expect("accept_request timed out");

    match item {
        DispatchItem::Request { request, .. } => {
            assert_eq!(request.method, Method::Register);
            assert_eq!(request.headers.get("Call-ID"), "call-1");
        }
        DispatchItem::Error { error, .. } => panic!("unexpected error: {error}"),
    }
}

#[tokio::test]
async fn tcp_request_round_trip_through_listener() {
    let (listener, addr) = bind_loopback_listener().await;

    let conn = dial_tcp(addr).await.unwrap();
    let req = register_request("call-2", "z9hG4bKtcp0001");
    conn.send_request(&req).await.unwrap();

    let item = tokio::time::timeout(Duration::from_secs(2), listener.accept_request())
        .await
        .expect("accept_request timed out");

    match item {
        DispatchItem::Request { request, .. } => {
            assert_eq!(request.headers.get("Call-ID"), "call-2");
        }
        DispatchItem::Error { error, .. } => panic!("unexpected error: {error}"),
    }
}

#[tokio::test]
async fn udp_keepalive_gets_short_pong() {
    let (_listener, addr) = bind_loopback_listener().await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(addr).await.unwrap();
    client.send(b"\r\n\r\n").await.unwrap();

    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(2), client.recv(&mut buf))
        .await
        .expect("keep-alive reply timed out")
        .unwrap();
    assert_eq!(&buf[..n], b"\r\n");
}

#[tokio::test]
async fn duplicate_branch_within_window_is_dropped() {
    let (listener, addr) = bind_loopback_listener().await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(addr).await.unwrap();

    let branch = "z9hG4bKrepeatedone";
    for call_id in ["call-a", "call-b"] {
        let bytes = sipgate_core::encode_request(&register_request(call_id, branch));
        client.send(&bytes).await.unwrap();
    }

    let first = tokio::time::timeout(Duration::from_secs(2), listener.accept_request())
        .await
        .expect("accept_request timed out");
    match first {
        DispatchItem::Request { request, .. } => assert_eq!(request.headers.get("Call-ID"), "call-a"),
        DispatchItem::Error { error, .. } => panic!("unexpected error: {error}"),
    }

    let second = tokio::time::timeout(Duration::from_millis(300), listener.accept_request()).await;
    assert!(second.is_err(), "duplicate branch should not reach the dispatcher");
}

#[tokio::test]
async fn missing_branch_surfaces_as_dispatch_error() {
    let (listener, addr) = bind_loopback_listener().await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(addr).await.unwrap();

    let mut req = Request::new(Method::Register, "sip:realm");
    req.headers.set("Via", "SIP/2.0/UDP 127.0.0.1");
    client.send(&sipgate_core::encode_request(&req)).await.unwrap();

    let item = tokio::time::timeout(Duration::from_secs(2), listener.accept_request())
        .await
        .expect("accept_request timed out");
    assert!(matches!(item, DispatchItem::Error { .. }));
}

#[tokio::test]
async fn lock_suspends_server_dispatch_until_unlock() {
    let (listener, addr) = bind_loopback_listener().await;
    let conn = dial_tcp(addr).await.unwrap();

    let item = {
        let req = register_request("call-3", "z9hG4bKlocktest");
        conn.send_request(&req).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), listener.accept_request())
            .await
            .expect("accept_request timed out")
    };
    let server_conn = match item {
        DispatchItem::Request { connection, .. } => connection,
        DispatchItem::Error { error, .. } => panic!("unexpected error: {error}"),
    };

    server_conn.lock().await;
    let req2 = register_request("call-4", "z9hG4bKlocktest2");
    conn.send_request(&req2).await.unwrap();

    let starved = tokio::time::timeout(Duration::from_millis(200), listener.accept_request()).await;
    assert!(starved.is_err(), "locked connection must not feed the dispatcher");

    let claimed = tokio::time::timeout(Duration::from_secs(2), server_conn.read_typed())
        .await
        .expect("handler read timed out");
    match claimed {
        ConnMessage::Request(r) => assert_eq!(r.headers.get("Call-ID"), "call-4"),
        other => panic!("unexpected message: {other:?}"),
    }

    server_conn.unlock().await;
}
