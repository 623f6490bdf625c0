//! The REGISTER handler: From/To cross-check, Digest-MD5 challenge/verify,
//! and registration bookkeeping.

use sipgate_core::header_args::parse_pairs;
use sipgate_core::{codec, parse_user_header, Request, Response, User};
use sipgate_transport::Connection;
use tracing::{info, warn};

use crate::account::Accounts;
use crate::auth_session::AuthSessions;
use crate::digest;
use crate::error::Result;
use crate::registered::RegisteredUsers;

const DIGEST_PREFIX: &str = "Digest ";

#[derive(Clone)]
pub struct Registrar {
    realm: String,
    accounts: Accounts,
    auth_sessions: AuthSessions,
    registered: RegisteredUsers,
}

impl Registrar {
    pub fn new(realm: impl Into<String>, accounts: Accounts) -> Self {
        let registrar = Registrar {
            realm: realm.into(),
            accounts,
            auth_sessions: AuthSessions::new(),
            registered: RegisteredUsers::new(),
        };
        registrar.auth_sessions.spawn_janitor();
        registrar
    }

    pub fn registered_users(&self) -> &RegisteredUsers {
        &self.registered
    }

    /// Runs the full REGISTER flow for `request`, arrived on `connection`,
    /// sending whatever response (or none, for silently-dropped impostor
    /// traffic) the flow produces.
    pub async fn handle_register(&self, request: &Request, connection: &Connection) -> Result<()> {
        let (to_result, from_result) = parse_user_header(&request.headers);
        let (to, from) = match (to_result, from_result) {
            (Ok(to), Ok(from)) => (to, from),
            _ => {
                return self
                    .reject(request, connection, 400, "Failed to parse From or To header.")
                    .await
            }
        };

        if to.uri.user_domain() != from.uri.user_domain() {
            return self
                .reject(request, connection, 400, "User in To and From fields do not match.")
                .await;
        }

        let authorization = request.headers.get("Authorization");
        if authorization.is_empty() {
            return self.challenge(request, connection, &from).await;
        }

        if authorization.len() < DIGEST_PREFIX.len()
            || !authorization[..DIGEST_PREFIX.len()].eq_ignore_ascii_case(DIGEST_PREFIX)
        {
            return self
                .reject(request, connection, 400, "Failed to parse Authorization header.")
                .await;
        }
        let args = parse_pairs(&authorization[DIGEST_PREFIX.len()..]);

        self.verify(request, connection, &from, &args).await
    }

    async fn reject(&self, request: &Request, connection: &Connection, status: u16, reason: &str) -> Result<()> {
        let mut response = self.reply_base(request, connection, status);
        response.headers.set("Reason-Phrase", reason);
        warn!(peer = %connection.remote_addr(), status, reason, "rejecting REGISTER");
        connection.send_response(&response).await?;
        Ok(())
    }

    async fn challenge(&self, request: &Request, connection: &Connection, from: &User) -> Result<()> {
        let call_id = request.headers.get("Call-ID");
        if call_id.is_empty() {
            return self
                .reject(request, connection, 400, "Missing required Call-ID header.")
                .await;
        }

        if let Some(existing) = self.auth_sessions.get(call_id) {
            if existing.connection.remote_addr() != connection.remote_addr() {
                warn!(peer = %connection.remote_addr(), call_id, "dropping REGISTER for call-id owned by another connection");
                return Ok(());
            }
        }

        let nonce = digest::fresh_nonce();

        let mut args = sipgate_core::HeaderArgs::new();
        args.set("realm", self.realm.clone());
        args.set("qop", "auth");
        args.set("nonce", nonce.clone());
        args.set("opaque", "");
        args.set("stale", "FALSE");
        args.set("algorithm", "MD5");

        let mut to = from.clone();
        to.arguments.del("tag");

        let mut response = self.reply_base(request, connection, 401);
        response.headers.set("From", request.headers.get("From"));
        response.headers.set("To", to.to_string());
        response.headers.set("WWW-Authenticate", format!("Digest {}", args.comma_string()));

        self.auth_sessions.challenge(call_id, nonce, from.uri.username.clone(), connection.clone());

        connection.send_response(&response).await?;
        Ok(())
    }

    async fn verify(
        &self,
        request: &Request,
        connection: &Connection,
        from: &User,
        args: &sipgate_core::HeaderArgs,
    ) -> Result<()> {
        let call_id = request.headers.get("Call-ID");
        let session = match self.auth_sessions.get(call_id) {
            Some(session) => session,
            None => return self.challenge(request, connection, from).await,
        };

        if session.connection.remote_addr() != connection.remote_addr() {
            warn!(peer = %connection.remote_addr(), call_id, "dropping REGISTER impersonating another connection's session");
            return Ok(());
        }

        if args.get("username") != from.uri.username {
            return self.challenge(request, connection, from).await;
        }
        if args.get("nonce") != session.nonce {
            return self.challenge(request, connection, from).await;
        }

        let password = match self.accounts.password_for(&from.uri.username) {
            Some(password) => password,
            None => return self.challenge(request, connection, from).await,
        };

        let ha1 = digest::ha1(&from.uri.username, &self.realm, password);
        let ha2 = digest::ha2("REGISTER", args.get("uri"));
        let expected = digest::response(&ha1, &session.nonce, args.get("nc"), args.get("cnonce"), "auth", &ha2);

        if args.get("response") != expected {
            return self.challenge(request, connection, from).await;
        }

        if request.headers.get("Expires").trim() == "0" {
            self.registered.deregister(&from.uri.username);
            info!(username = %from.uri.username, "deregistered");
        } else {
            self.registered.register(&from.uri.username, connection.clone()).await;
            info!(username = %from.uri.username, peer = %connection.remote_addr(), "registered");
        }

        let mut to = from.clone();
        to.arguments.set("tag", digest::fresh_tag());

        let mut response = self.reply_base(request, connection, 200);
        response.headers.set("From", request.headers.get("From"));
        response.headers.set("To", to.to_string());

        self.auth_sessions.remove(call_id);

        connection.send_response(&response).await?;
        Ok(())
    }

    fn reply_base(&self, request: &Request, connection: &Connection, status: u16) -> Response {
        let addr = connection.remote_addr();
        codec::reply_to(request, status, &addr.ip().to_string(), addr.port())
    }
}
