//! One duplex peer connection, over either a UDP 5-tuple or an accepted TCP
//! stream, with read-side arbitration between the server dispatcher and
//! handlers that temporarily steal the read side.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, trace, warn};

use sipgate_core::codec::{self, Decoded};
use sipgate_core::{ConnMessage, Request, Response};

use crate::error::{Error, Result};

const KEEPALIVE_PING: &[u8] = b"\r\n\r\n";
const KEEPALIVE_PONG: &[u8] = b"\r\n";
pub(crate) const MAX_UDP_DATAGRAM: usize = 65535;

enum TransportKind {
    Udp { socket: Arc<UdpSocket> },
    Tcp { write_half: Mutex<OwnedWriteHalf> },
}

struct ConnState {
    queue: VecDeque<ConnMessage>,
    locked: bool,
}

struct Inner {
    transport: TransportKind,
    remote_addr: SocketAddr,
    closed: AtomicBool,
    write_buf: Mutex<Vec<u8>>,
    state: Mutex<ConnState>,
    notify: Notify,
    last_activity: std::sync::Mutex<Instant>,
    on_close: Option<Arc<dyn Fn(SocketAddr) + Send + Sync>>,
}

/// A duplex peer connection. Cheap to clone; clones share the same
/// underlying socket and read/write state.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

fn eof_error() -> sipgate_core::Error {
    sipgate_core::Error::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "connection closed",
    ))
}

impl Connection {
    /// Wraps an accepted TCP stream and starts its framer task.
    pub fn from_tcp_stream(stream: TcpStream, remote_addr: SocketAddr) -> Connection {
        let (read_half, write_half) = stream.into_split();
        let conn = Connection {
            inner: Arc::new(Inner {
                transport: TransportKind::Tcp {
                    write_half: Mutex::new(write_half),
                },
                remote_addr,
                closed: AtomicBool::new(false),
                write_buf: Mutex::new(Vec::new()),
                state: Mutex::new(ConnState {
                    queue: VecDeque::new(),
                    locked: false,
                }),
                notify: Notify::new(),
                last_activity: std::sync::Mutex::new(Instant::now()),
                on_close: None,
            }),
        };
        conn.spawn_tcp_framer(read_half);
        conn
    }

    /// Creates a UDP-backed connection for `remote_addr` on the given shared
    /// socket, returning the connection and the sender the caller should use
    /// to hand it inbound datagrams. `on_close` is invoked (with the remote
    /// address) when the connection closes, so the owning pool can evict it.
    pub fn from_udp_socket(
        socket: Arc<UdpSocket>,
        remote_addr: SocketAddr,
        on_close: Arc<dyn Fn(SocketAddr) + Send + Sync>,
    ) -> (Connection, mpsc::UnboundedSender<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection {
            inner: Arc::new(Inner {
                transport: TransportKind::Udp { socket },
                remote_addr,
                closed: AtomicBool::new(false),
                write_buf: Mutex::new(Vec::new()),
                state: Mutex::new(ConnState {
                    queue: VecDeque::new(),
                    locked: false,
                }),
                notify: Notify::new(),
                last_activity: std::sync::Mutex::new(Instant::now()),
                on_close: Some(on_close),
            }),
        };
        conn.spawn_udp_framer(rx);
        (conn, tx)
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn is_udp(&self) -> bool {
        matches!(self.inner.transport, TransportKind::Udp { .. })
    }

    pub fn last_activity(&self) -> Instant {
        *self.inner.last_activity.lock().expect("last_activity mutex poisoned")
    }

    fn touch(&self) {
        *self.inner.last_activity.lock().expect("last_activity mutex poisoned") = Instant::now();
    }

    /// Appends `bytes` to the write buffer without sending anything yet.
    pub async fn write(&self, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let mut buf = self.inner.write_buf.lock().await;
        buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Sends the accumulated write buffer as one atomic unit: one datagram
    /// for UDP, one contiguous write for TCP. No-op if the buffer is empty.
    pub async fn flush(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let data = {
            let mut buf = self.inner.write_buf.lock().await;
            if buf.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *buf)
        };
        match &self.inner.transport {
            TransportKind::Udp { socket } => {
                socket.send_to(&data, self.inner.remote_addr).await?;
            }
            TransportKind::Tcp { write_half } => {
                let mut wh = write_half.lock().await;
                wh.write_all(&data).await?;
            }
        }
        Ok(())
    }

    /// Convenience: write then flush in one call.
    pub async fn send(&self, bytes: &[u8]) -> Result<()> {
        self.write(bytes).await?;
        self.flush().await
    }

    pub async fn send_request(&self, request: &Request) -> Result<()> {
        self.send(&codec::encode_request(request)).await
    }

    pub async fn send_response(&self, response: &Response) -> Result<()> {
        self.send(&codec::encode_response(response)).await
    }

    /// Claims the read side for a handler. Idempotent.
    pub async fn lock(&self) {
        let mut state = self.inner.state.lock().await;
        state.locked = true;
    }

    /// Releases the read side back to the server dispatcher. A no-op if not
    /// currently locked.
    pub async fn unlock(&self) {
        {
            let mut state = self.inner.state.lock().await;
            state.locked = false;
        }
        self.inner.notify.notify_waiters();
    }

    /// The server-facing reader: returns the next Request or framing Error,
    /// silently dropping any Response that arrives while unlocked. Suspends
    /// while the connection is locked by a handler.
    pub async fn read_request(&self) -> ConnMessage {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.inner.state.lock().await;
                if !state.locked {
                    while matches!(state.queue.front(), Some(ConnMessage::Response(_))) {
                        warn!(peer = %self.inner.remote_addr, "dropping unsolicited response on unlocked connection");
                        state.queue.pop_front();
                    }
                    if !state.queue.is_empty() {
                        return state.queue.pop_front().expect("checked non-empty above");
                    }
                }
                if self.is_closed() {
                    return ConnMessage::Error(eof_error());
                }
            }
            notified.await;
        }
    }

    /// The user-facing reader for handlers that hold the lock: returns the
    /// next message of any kind in arrival order.
    pub async fn read_typed(&self) -> ConnMessage {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.inner.state.lock().await;
                if !state.queue.is_empty() {
                    return state.queue.pop_front().expect("checked non-empty above");
                }
                if self.is_closed() {
                    return ConnMessage::Error(eof_error());
                }
            }
            notified.await;
        }
    }

    async fn enqueue(&self, message: ConnMessage) {
        {
            let mut state = self.inner.state.lock().await;
            state.queue.push_back(message);
        }
        self.inner.notify.notify_waiters();
    }

    /// Closes the connection: for UDP, evicts it from the owning pool; for
    /// TCP, shuts down the stream. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match &self.inner.transport {
            TransportKind::Udp { .. } => {
                if let Some(on_close) = &self.inner.on_close {
                    on_close(self.inner.remote_addr);
                }
            }
            TransportKind::Tcp { write_half } => {
                let mut wh = write_half.lock().await;
                let _ = wh.shutdown().await;
            }
        }
        self.inner.notify.notify_waiters();
    }

    fn spawn_udp_framer(&self, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        let conn = self.clone();
        tokio::spawn(async move {
            while let Some(datagram) = rx.recv().await {
                conn.touch();
                if datagram.as_slice() == KEEPALIVE_PING {
                    trace!(peer = %conn.inner.remote_addr, "udp keep-alive ping");
                    if let Err(e) = conn.send(KEEPALIVE_PONG).await {
                        debug!(peer = %conn.inner.remote_addr, error = %e, "keep-alive reply failed");
                    }
                    continue;
                }
                match codec::decode(&datagram) {
                    Decoded::Message { message, .. } => conn.enqueue(message).await,
                    Decoded::Incomplete => {
                        conn.enqueue(ConnMessage::Error(sipgate_core::Error::BadMessage)).await;
                    }
                }
            }
            conn.close().await;
        });
    }

    fn spawn_tcp_framer(&self, mut read_half: tokio::net::tcp::OwnedReadHalf) {
        let conn = self.clone();
        tokio::spawn(async move {
            let mut buf: Vec<u8> = Vec::with_capacity(4096);
            let mut chunk = [0u8; 4096];
            loop {
                loop {
                    match codec::decode(&buf) {
                        Decoded::Message { message, consumed } => {
                            buf.drain(..consumed);
                            conn.enqueue(message).await;
                        }
                        Decoded::Incomplete => break,
                    }
                }
                match read_half.read(&mut chunk).await {
                    Ok(0) => {
                        conn.enqueue(ConnMessage::Error(eof_error())).await;
                        break;
                    }
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        conn.enqueue(ConnMessage::Error(sipgate_core::Error::Io(e))).await;
                        break;
                    }
                }
            }
            conn.close().await;
        });
    }
}

/// Dials a TCP peer with a bounded connect timeout, per the no-explicit-
/// read-timeouts / 10s-dial policy.
pub async fn dial_tcp(addr: SocketAddr) -> Result<Connection> {
    let stream = tokio::time::timeout(Duration::from_secs(10), TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "tcp dial timed out")))??;
    Ok(Connection::from_tcp_stream(stream, addr))
}
