//! The registered-user table: username -> bound Connection.

use std::sync::Arc;

use dashmap::DashMap;
use sipgate_transport::Connection;
use tracing::debug;

#[derive(Clone, Default)]
pub struct RegisteredUsers {
    table: Arc<DashMap<String, Connection>>,
}

impl RegisteredUsers {
    pub fn new() -> Self {
        RegisteredUsers::default()
    }

    pub fn get(&self, username: &str) -> Option<Connection> {
        self.table.get(username).map(|entry| entry.value().clone())
    }

    /// Binds `username` to `connection`, closing any previously-bound
    /// connection first.
    pub async fn register(&self, username: &str, connection: Connection) {
        if let Some((_, previous)) = self.table.remove(username) {
            if previous.remote_addr() != connection.remote_addr() {
                debug!(%username, "closing previous registration before overwrite");
            }
            previous.close().await;
        }
        self.table.insert(username.to_string(), connection);
    }

    pub fn deregister(&self, username: &str) {
        self.table.remove(username);
    }

    /// True if `username` is currently bound to exactly `connection`.
    pub fn is_bound_to(&self, username: &str, connection: &Connection) -> bool {
        self.table
            .get(username)
            .map(|entry| entry.value().remote_addr() == connection.remote_addr())
            .unwrap_or(false)
    }
}
