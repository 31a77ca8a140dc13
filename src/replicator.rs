//! Backlog replication: drain the broker into a durable backend.
//!
//! A fixed-interval loop pulls the broker's pending backlog, applies every
//! operation in order to the durable backend through the same dispatch
//! table the broker uses, writes a per-queue snapshot of the durable state
//! to disk, and only then acknowledges the backlog with its content
//! signature. A failure anywhere in a cycle means no ack, so the broker
//! re-delivers the same backlog verbatim on the next pull - at least once,
//! with order preserved inside each batch.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::client::ReplicationClient;
use crate::protocol::Operation;
use crate::queue::{dispatch, Backend, DispatchError, DurableBackend, QueueError};

pub struct ReplicatorConfig {
    /// Address of the broker's replication endpoint.
    pub broker_addr: String,
    /// Directory receiving one snapshot file per queue.
    pub snapshot_dir: PathBuf,
    /// Pull cadence.
    pub interval: Duration,
}

impl ReplicatorConfig {
    pub fn new(broker_addr: impl Into<String>, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            broker_addr: broker_addr.into(),
            snapshot_dir: snapshot_dir.into(),
            interval: Duration::from_secs(5),
        }
    }
}

pub struct Replicator {
    client: ReplicationClient,
    durable: DurableBackend,
    snapshot_dir: PathBuf,
    interval: Duration,
}

impl Replicator {
    pub fn new(config: ReplicatorConfig, durable: DurableBackend) -> Self {
        Self {
            client: ReplicationClient::new(config.broker_addr),
            durable,
            snapshot_dir: config.snapshot_dir,
            interval: config.interval,
        }
    }

    /// Run cycles until shutdown. Cycle failures are logged and absorbed;
    /// the next tick retries the whole backlog.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "replicator running");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.cycle().await {
                        warn!(error = %err, "replication cycle abandoned, backlog will be re-delivered");
                    }
                }
                _ = shutdown.recv() => {
                    info!("replicator stopping");
                    break;
                }
            }
        }
    }

    /// One pull-apply-snapshot-ack cycle.
    pub async fn cycle(&self) -> Result<(), QueueError> {
        let Some((payload, operations)) = self.client.fetch_backlog().await? else {
            debug!("no backlog pending");
            return Ok(());
        };

        let started = Instant::now();
        let applied = self.apply(&operations)?;
        self.write_snapshots()?;

        let signature = blake3::hash(&payload).to_hex().to_string();
        let acked = self.client.ack(&signature).await?;
        info!(
            operations = operations.len(),
            applied,
            acked,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backlog replicated"
        );
        Ok(())
    }

    /// Apply operations in received order. Unknown or malformed operations
    /// are skipped - they would fail on every future delivery too - while
    /// backend errors abort the cycle so the batch is retried whole.
    fn apply(&self, operations: &[Operation]) -> Result<usize, QueueError> {
        let mut applied = 0;
        for operation in operations {
            match dispatch(&self.durable, operation) {
                Ok(_) => applied += 1,
                Err(DispatchError::UnknownOperation(method)) => {
                    warn!(method = %method, "skipping unknown operation");
                }
                Err(DispatchError::InvalidArguments(reason)) => {
                    warn!(method = %operation.method(), reason, "skipping malformed operation");
                }
                Err(DispatchError::Queue(err)) => return Err(err),
            }
        }
        Ok(applied)
    }

    /// Project the durable state to disk: one file per queue, overwritten
    /// every cycle. A coarse recovery aid, not a source of truth.
    fn write_snapshots(&self) -> Result<(), QueueError> {
        fs::create_dir_all(&self.snapshot_dir)?;
        for queue in self.durable.list_queues()? {
            let entries = self.durable.list(&queue)?;
            let path = self
                .snapshot_dir
                .join(format!("{}.json", sanitize_file_name(&queue)));
            fs::write(&path, serde_json::to_vec(&entries)?)?;
        }
        Ok(())
    }
}

/// Queue names become file names; anything a filesystem might object to is
/// replaced.
fn sanitize_file_name(queue: &str) -> String {
    queue
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
