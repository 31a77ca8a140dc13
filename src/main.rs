use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use tokio::net::{TcpListener, UnixListener};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use relayq::server::{handle_primary, handle_replication, Broker};
use relayq::shutdown::shutdown_signal;
use relayq::telemetry;

const DEFAULT_BIND: &str = "127.0.0.1:6091";
const DEFAULT_REPLICATION_BIND: &str = "127.0.0.1:6092";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();

    let bind = std::env::var("RELAYQ_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let replication_bind = std::env::var("RELAYQ_REPLICATION_BIND")
        .unwrap_or_else(|_| DEFAULT_REPLICATION_BIND.to_string());

    let broker = Arc::new(Broker::new());
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    tokio::spawn(shutdown_signal(shutdown_tx.clone()));

    // The replication endpoint runs on its own task so a slow backlog pull
    // never starves item traffic, and vice versa.
    let replication_listener = TcpListener::bind(&replication_bind).await?;
    info!(addr = %replication_bind, "replication endpoint listening");
    spawn_replication_loop(replication_listener, Arc::clone(&broker), &shutdown_tx);

    if let Ok(path) = std::env::var("UNIX_SOCKET") {
        spawn_unix_loop(&path, Arc::clone(&broker), &shutdown_tx)?;
    }

    let listener = TcpListener::bind(&bind).await?;
    info!(addr = %bind, "relayq broker listening");

    let mut shutdown = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    let broker = Arc::clone(&broker);
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        if let Err(e) = handle_primary(reader, writer, broker).await {
                            warn!(peer = %peer, error = %e, "connection closed");
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept failed"),
            },
            _ = shutdown.recv() => break,
        }
    }

    info!("shutdown complete");
    Ok(())
}

fn spawn_replication_loop(
    listener: TcpListener,
    broker: Arc<Broker>,
    shutdown_tx: &broadcast::Sender<()>,
) {
    let mut shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let broker = Arc::clone(&broker);
                        tokio::spawn(async move {
                            let (reader, writer) = stream.into_split();
                            if let Err(e) = handle_replication(reader, writer, broker).await {
                                warn!(peer = %peer, error = %e, "replication connection closed");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "replication accept failed"),
                },
                _ = shutdown.recv() => break,
            }
        }
    });
}

fn spawn_unix_loop(
    path: &str,
    broker: Arc<Broker>,
    shutdown_tx: &broadcast::Sender<()>,
) -> std::io::Result<()> {
    // A leftover socket file from an unclean exit would block the bind.
    let _ = std::fs::remove_file(path);
    let listener = UnixListener::bind(path)?;
    info!(path = %path, "unix socket listening");

    let mut shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let broker = Arc::clone(&broker);
                        tokio::spawn(async move {
                            let (reader, writer) = stream.into_split();
                            if let Err(e) = handle_primary(reader, writer, broker).await {
                                warn!(error = %e, "unix connection closed");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "unix accept failed"),
                },
                _ = shutdown.recv() => break,
            }
        }
    });
    Ok(())
}
