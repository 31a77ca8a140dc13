use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use relayq::queue::{DurableBackend, MemoryStore, Store};
use relayq::replicator::{Replicator, ReplicatorConfig};
use relayq::shutdown::shutdown_signal;
use relayq::telemetry;

const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:6092";
const DEFAULT_SNAPSHOT_DIR: &str = "/var/tmp/relayq-snapshots";
const DEFAULT_INTERVAL_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init();

    let broker_addr =
        std::env::var("RELAYQ_BROKER_ADDR").unwrap_or_else(|_| DEFAULT_BROKER_ADDR.to_string());
    let snapshot_dir = PathBuf::from(
        std::env::var("SNAPSHOT_DIR").unwrap_or_else(|_| DEFAULT_SNAPSHOT_DIR.to_string()),
    );
    let interval_secs = std::env::var("REPLICATION_INTERVAL_SECS")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(DEFAULT_INTERVAL_SECS);

    let store = make_store()?;
    let durable = DurableBackend::new(store);

    let mut config = ReplicatorConfig::new(broker_addr.clone(), snapshot_dir.clone());
    config.interval = Duration::from_secs(interval_secs);
    let replicator = Replicator::new(config, durable);

    info!(broker = %broker_addr, snapshots = %snapshot_dir.display(), "replicator starting");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    tokio::spawn(shutdown_signal(shutdown_tx.clone()));
    replicator.run(shutdown_tx.subscribe()).await;
    Ok(())
}

#[cfg(feature = "redis")]
fn make_store() -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    match std::env::var("REDIS_URL") {
        Ok(url) => {
            info!(url = %url, "using redis store");
            Ok(Arc::new(relayq::queue::RedisStore::connect(&url)?))
        }
        Err(_) => {
            tracing::warn!("REDIS_URL not set, durable state is process-local");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(not(feature = "redis"))]
fn make_store() -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    if std::env::var("REDIS_URL").is_ok() {
        tracing::warn!("REDIS_URL set but this build has no redis support");
    }
    Ok(Arc::new(MemoryStore::new()))
}
