//! The in-flight Digest challenge state, keyed by Call-ID, with a 30s
//! expiry janitor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sipgate_transport::Connection;
use tracing::debug;

const SESSION_TTL: Duration = Duration::from_secs(30);
const JANITOR_PERIOD: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AuthSession {
    pub nonce: String,
    pub username: String,
    pub connection: Connection,
    pub created: Instant,
}

#[derive(Clone, Default)]
pub struct AuthSessions {
    table: Arc<DashMap<String, AuthSession>>,
}

impl AuthSessions {
    pub fn new() -> Self {
        AuthSessions::default()
    }

    /// Records (or replaces) the auth-session for `call_id`.
    pub fn challenge(&self, call_id: &str, nonce: String, username: String, connection: Connection) {
        self.table.insert(
            call_id.to_string(),
            AuthSession { nonce, username, connection, created: Instant::now() },
        );
    }

    pub fn get(&self, call_id: &str) -> Option<AuthSession> {
        self.table.get(call_id).map(|entry| entry.value().clone())
    }

    /// Drops the session for `call_id` (after a successful verify, to
    /// prevent replay).
    pub fn remove(&self, call_id: &str) {
        self.table.remove(call_id);
    }

    /// Spawns the background task that reaps sessions older than 30s,
    /// checking every 10s.
    pub fn spawn_janitor(&self) {
        let sessions = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(JANITOR_PERIOD);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let before = sessions.table.len();
                sessions.table.retain(|_, session| now.duration_since(session.created) <= SESSION_TTL);
                let reaped = before.saturating_sub(sessions.table.len());
                if reaped > 0 {
                    debug!(reaped, "expired stale auth sessions");
                }
            }
        });
    }
}
