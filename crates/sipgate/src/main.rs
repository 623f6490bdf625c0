//! Entry point: loads configuration, binds the dual-transport listener, and
//! dispatches incoming requests to the registrar or the dialog bridge.

mod config;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sipgate_registrar::{Accounts, Registrar};
use sipgate_transport::{DispatchItem, Listener};

use config::{Cli, Config};

fn init_logging(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    init_logging(config.log_level.as_deref());

    info!(listen_addr = %config.listen_addr, realm = %config.realm, "starting sipgate");

    let listener = Listener::bind(config.listen_addr).await.map_err(|e| {
        error!(error = %e, "failed to bind listener");
        e
    })?;

    let accounts = Accounts::new(config.accounts);
    let registrar = Registrar::new(config.realm, accounts);

    run(listener, registrar).await;
    Ok(())
}

async fn run(listener: Listener, registrar: Registrar) {
    loop {
        match listener.accept_request().await {
            DispatchItem::Request { connection, request } => {
                let registrar = registrar.clone();
                tokio::spawn(async move {
                    dispatch(request, connection, registrar).await;
                });
            }
            DispatchItem::Error { error, .. } => {
                if matches!(&error, sipgate_transport::Error::Closed) {
                    info!("listener closed, shutting down dispatch loop");
                    return;
                }
                warn!(error = %error, "listener dispatch error");
            }
        }
    }
}

async fn dispatch(request: sipgate_core::Request, connection: sipgate_transport::Connection, registrar: Registrar) {
    use sipgate_core::Method;

    let result = match request.method {
        Method::Register => registrar.handle_register(&request, &connection).await.map_err(anyhow::Error::from),
        Method::Invite => sipgate_dialog::handle_invite(&request, &connection, registrar.registered_users())
            .await
            .map_err(anyhow::Error::from),
        ref other => {
            warn!(method = %other, peer = %connection.remote_addr(), "unknown method");
            return;
        }
    };

    if let Err(e) = result {
        warn!(error = %e, peer = %connection.remote_addr(), "request handling failed");
    }
}
