//! Dual UDP/TCP listener: accepts/demultiplexes inbound traffic into
//! per-peer [`Connection`]s and a single dispatch queue, with UDP idle
//! reaping and Via-branch de-duplication at the edge.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, warn};

use sipgate_core::{ConnMessage, Request, Via};

use crate::connection::{Connection, MAX_UDP_DATAGRAM};
use crate::error::{Error, Result};

const IDLE_JANITOR_PERIOD: Duration = Duration::from_secs(10);
const BRANCH_JANITOR_PERIOD: Duration = Duration::from_secs(10);
const UDP_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const BRANCH_WINDOW: Duration = Duration::from_secs(30);
const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";
const BRANCH_MIN_LEN: usize = 8;

/// One item off the listener's dispatch queue.
pub enum DispatchItem {
    Request { connection: Connection, request: Request },
    Error { connection: Option<Connection>, error: Error },
}

struct ListenerInner {
    tcp_listener: TcpListener,
    udp_socket: Arc<UdpSocket>,
    pool: DashMap<SocketAddr, (Connection, mpsc::UnboundedSender<Vec<u8>>)>,
    branches: DashMap<String, Instant>,
    dispatch_tx: mpsc::UnboundedSender<DispatchItem>,
    dispatch_rx: Mutex<mpsc::UnboundedReceiver<DispatchItem>>,
    closed: AtomicBool,
    shutdown: Notify,
}

#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl Listener {
    /// Binds `addr` on both TCP and UDP and starts the accept/receive/
    /// janitor tasks. Binds UDP first and reuses its resolved local address
    /// for the TCP bind, so a `:0` port picks one ephemeral port shared by
    /// both transports rather than two independent ones. Releases whichever
    /// socket bound first if the second bind fails.
    pub async fn bind(addr: SocketAddr) -> Result<Listener> {
        let udp_socket = UdpSocket::bind(addr).await?;
        let bound_addr = udp_socket.local_addr()?;
        let tcp_listener = match TcpListener::bind(bound_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                drop(udp_socket);
                return Err(Error::Io(e));
            }
        };

        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let listener = Listener {
            inner: Arc::new(ListenerInner {
                tcp_listener,
                udp_socket: Arc::new(udp_socket),
                pool: DashMap::new(),
                branches: DashMap::new(),
                dispatch_tx,
                dispatch_rx: Mutex::new(dispatch_rx),
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
        };

        listener.spawn_tasks();
        Ok(listener)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.tcp_listener.local_addr()?)
    }

    fn spawn_tasks(&self) {
        let tcp = self.clone();
        tokio::spawn(async move { tcp.tcp_accept_loop().await });

        let udp = self.clone();
        tokio::spawn(async move { udp.udp_receive_loop().await });

        let idle = self.clone();
        tokio::spawn(async move { idle.udp_idle_janitor().await });

        let branches = self.clone();
        tokio::spawn(async move { branches.branch_janitor().await });
    }

    async fn tcp_accept_loop(self) {
        loop {
            tokio::select! {
                _ = self.inner.shutdown.notified() => break,
                accepted = self.inner.tcp_listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let conn = Connection::from_tcp_stream(stream, peer);
                            self.spawn_dispatch_feeder(conn);
                        }
                        Err(e) => {
                            if self.inner.closed.load(Ordering::Acquire) {
                                break;
                            }
                            warn!(error = %e, "tcp accept failed");
                            let _ = self.inner.dispatch_tx.send(DispatchItem::Error { connection: None, error: Error::Io(e) });
                        }
                    }
                }
            }
        }
    }

    async fn udp_receive_loop(self) {
        let mut buf = vec![0u8; MAX_UDP_DATAGRAM];
        loop {
            tokio::select! {
                _ = self.inner.shutdown.notified() => break,
                received = self.inner.udp_socket.recv_from(&mut buf) => {
                    match received {
                        Ok((n, peer)) => {
                            let datagram = buf[..n].to_vec();
                            let sender = self.udp_connection_for(peer);
                            let _ = sender.send(datagram);
                        }
                        Err(e) => {
                            if self.inner.closed.load(Ordering::Acquire) {
                                break;
                            }
                            warn!(error = %e, "udp recv_from failed");
                        }
                    }
                }
            }
        }
    }

    /// Returns the inbound-datagram sender for `peer`'s connection, lazily
    /// creating the connection (and its dispatch feeder) on first contact.
    fn udp_connection_for(&self, peer: SocketAddr) -> mpsc::UnboundedSender<Vec<u8>> {
        if let Some(entry) = self.inner.pool.get(&peer) {
            return entry.value().1.clone();
        }

        let inner_for_close = self.inner.clone();
        let on_close: Arc<dyn Fn(SocketAddr) + Send + Sync> =
            Arc::new(move |addr: SocketAddr| {
                inner_for_close.pool.remove(&addr);
            });

        let (conn, sender) = Connection::from_udp_socket(self.inner.udp_socket.clone(), peer, on_close);
        self.inner.pool.insert(peer, (conn.clone(), sender.clone()));
        self.spawn_dispatch_feeder(conn);
        sender
    }

    /// Drives a connection's server-facing reader, forwarding framed
    /// Requests (and terminal errors) onto the listener's dispatch queue.
    fn spawn_dispatch_feeder(&self, conn: Connection) {
        let dispatch_tx = self.inner.dispatch_tx.clone();
        tokio::spawn(async move {
            loop {
                match conn.read_request().await {
                    ConnMessage::Request(request) => {
                        if dispatch_tx
                            .send(DispatchItem::Request { connection: conn.clone(), request })
                            .is_err()
                        {
                            break;
                        }
                    }
                    ConnMessage::Response(_) => unreachable!("read_request never yields a Response"),
                    ConnMessage::Error(sipgate_core::Error::Io(e))
                        if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                    {
                        let _ = dispatch_tx.send(DispatchItem::Error {
                            connection: Some(conn.clone()),
                            error: Error::Io(e),
                        });
                        break;
                    }
                    ConnMessage::Error(e) => {
                        let _ = dispatch_tx.send(DispatchItem::Error {
                            connection: Some(conn.clone()),
                            error: Error::Message(e),
                        });
                    }
                }
            }
        });
    }

    async fn udp_idle_janitor(self) {
        let mut ticker = tokio::time::interval(IDLE_JANITOR_PERIOD);
        loop {
            ticker.tick().await;
            if self.inner.closed.load(Ordering::Acquire) {
                break;
            }
            let now = Instant::now();
            let stale: Vec<SocketAddr> = self
                .inner
                .pool
                .iter()
                .filter(|entry| now.duration_since(entry.value().0.last_activity()) > UDP_IDLE_TIMEOUT)
                .map(|entry| *entry.key())
                .collect();

            for addr in stale {
                if let Some((_, (conn, _))) = self.inner.pool.remove(&addr) {
                    debug!(peer = %addr, "reaping idle udp connection");
                    conn.close().await;
                }
            }
        }
    }

    async fn branch_janitor(self) {
        let mut ticker = tokio::time::interval(BRANCH_JANITOR_PERIOD);
        loop {
            ticker.tick().await;
            if self.inner.closed.load(Ordering::Acquire) {
                break;
            }
            let now = Instant::now();
            self.inner.branches.retain(|_, seen| now.duration_since(*seen) <= BRANCH_WINDOW);
        }
    }

    fn check_branch(&self, request: &Request) -> std::result::Result<bool, Error> {
        let via = Via::parse(request.headers.get("Via")).map_err(|_| Error::MissingBranch)?;
        let branch = via.arguments.get("branch");
        if branch.is_empty() {
            return Err(Error::MissingBranch);
        }
        if branch.len() < BRANCH_MIN_LEN || !branch.starts_with(BRANCH_MAGIC_COOKIE) {
            return Err(Error::InvalidBranch);
        }

        let now = Instant::now();
        if let Some(seen) = self.inner.branches.get(branch) {
            if now.duration_since(*seen) < BRANCH_WINDOW {
                return Ok(false);
            }
        }
        self.inner.branches.insert(branch.to_string(), now);
        Ok(true)
    }

    /// Blocks until the next dispatch-worthy item: a de-duplicated Request,
    /// or a framing/accept error. Requests with a duplicate branch within
    /// the de-duplication window are silently dropped and never surfaced.
    pub async fn accept_request(&self) -> DispatchItem {
        loop {
            let item = {
                let mut rx = self.inner.dispatch_rx.lock().await;
                rx.recv().await
            };
            let item = match item {
                Some(item) => item,
                None => return DispatchItem::Error { connection: None, error: Error::Closed },
            };

            match item {
                DispatchItem::Request { connection, request } => match self.check_branch(&request) {
                    Ok(true) => return DispatchItem::Request { connection, request },
                    Ok(false) => continue,
                    Err(e) => return DispatchItem::Error { connection: Some(connection), error: e },
                },
                other => return other,
            }
        }
    }

    /// Sets closed, wakes the accept/receive loops so they stop taking new
    /// work, and drains whatever is already queued without blocking.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown.notify_waiters();

        let mut rx = self.inner.dispatch_rx.lock().await;
        while rx.try_recv().is_ok() {}
    }
}
