//! Remote access to a broker: the queue client stub and the replication
//! client.
//!
//! `RemoteQueue` mirrors the backend operation surface over the wire. A
//! fixed-size connection pool bounds the number of in-flight calls; callers
//! past the bound wait for a slot. Connections are reused across calls and
//! thrown away on any I/O error, since a half-finished request/reply
//! exchange leaves a socket useless.

use std::io;

use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Semaphore};

use crate::protocol::{
    self, read_frame, write_frame, Envelope, Operation, ACK_PREFIX, BACKLOG_REQUEST,
};
use crate::queue::{QueueError, QueueItem};

/// Default pool size, matching the original deployment's client pool.
pub const DEFAULT_POOL_SIZE: usize = 20;

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    buf: Vec<u8>,
}

impl Connection {
    async fn dial(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            buf: Vec::with_capacity(8192),
        })
    }

    /// One request/reply round trip.
    async fn call(&mut self, payload: &[u8]) -> io::Result<Vec<u8>> {
        write_frame(&mut self.writer, payload).await?;
        self.writer.flush().await?;
        if !read_frame(&mut self.reader, &mut self.buf).await? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-call",
            ));
        }
        Ok(self.buf.clone())
    }
}

struct Pool {
    addr: String,
    slots: Semaphore,
    idle: Mutex<Vec<Connection>>,
}

impl Pool {
    fn new(addr: String, size: usize) -> Self {
        Self {
            addr,
            slots: Semaphore::new(size),
            idle: Mutex::new(Vec::with_capacity(size)),
        }
    }

    async fn request(&self, payload: &[u8]) -> Result<Vec<u8>, QueueError> {
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|_| QueueError::Remote("connection pool closed".into()))?;

        let idle = self.idle.lock().await.pop();
        let mut conn = match idle {
            Some(conn) => conn,
            None => Connection::dial(&self.addr).await?,
        };

        match conn.call(payload).await {
            Ok(reply) => {
                self.idle.lock().await.push(conn);
                Ok(reply)
            }
            Err(_) => {
                // The pooled socket went bad; retry once on a fresh one.
                let mut conn = Connection::dial(&self.addr).await?;
                let reply = conn.call(payload).await?;
                self.idle.lock().await.push(conn);
                Ok(reply)
            }
        }
    }
}

/// Client stub for the broker's primary endpoint.
pub struct RemoteQueue {
    pool: Pool,
}

impl RemoteQueue {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_pool_size(addr, DEFAULT_POOL_SIZE)
    }

    pub fn with_pool_size(addr: impl Into<String>, size: usize) -> Self {
        Self {
            pool: Pool::new(addr.into(), size),
        }
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, QueueError> {
        let payload = protocol::encode(&Envelope::new(method, args))
            .map_err(|err| QueueError::Remote(err.to_string()))?;
        let reply = self.pool.request(&payload).await?;
        protocol::decode(&reply).map_err(|err| QueueError::Remote(err.to_string()))
    }

    /// The broker answers requests it could not dispatch with `false`.
    fn reject_sentinel(method: &str, reply: Value) -> Result<Value, QueueError> {
        match reply {
            Value::Bool(false) => Err(QueueError::Remote(format!("{method} was rejected"))),
            other => Ok(other),
        }
    }

    async fn checked_call(&self, method: &str, args: Vec<Value>) -> Result<Value, QueueError> {
        let reply = self.call(method, args).await?;
        Self::reject_sentinel(method, reply)
    }

    fn decode_entry(reply: Value) -> Result<Option<QueueItem>, QueueError> {
        match reply {
            Value::Null => Ok(None),
            other => serde_json::from_value(other)
                .map(Some)
                .map_err(|err| QueueError::Remote(err.to_string())),
        }
    }

    pub async fn add(
        &self,
        queue: &str,
        item: Value,
        metadata: Value,
    ) -> Result<u64, QueueError> {
        let reply = self
            .checked_call("add", vec![json!(queue), item, metadata])
            .await?;
        reply
            .as_u64()
            .ok_or_else(|| QueueError::Remote(format!("unexpected add reply: {reply}")))
    }

    pub async fn add_bulk(&self, queue: &str, items: Vec<Value>) -> Result<(), QueueError> {
        self.checked_call("add_bulk", vec![json!(queue), Value::Array(items)])
            .await?;
        Ok(())
    }

    pub async fn remove(&self, queue: &str) -> Result<Option<QueueItem>, QueueError> {
        Self::decode_entry(self.checked_call("remove", vec![json!(queue)]).await?)
    }

    pub async fn peek(&self, queue: &str) -> Result<Option<QueueItem>, QueueError> {
        Self::decode_entry(self.checked_call("peek", vec![json!(queue)]).await?)
    }

    pub async fn size(&self, queue: &str) -> Result<u64, QueueError> {
        let reply = self.checked_call("size", vec![json!(queue)]).await?;
        reply
            .as_u64()
            .ok_or_else(|| QueueError::Remote(format!("unexpected size reply: {reply}")))
    }

    pub async fn list(&self, queue: &str) -> Result<Vec<QueueItem>, QueueError> {
        let reply = self.checked_call("list", vec![json!(queue)]).await?;
        serde_json::from_value(reply).map_err(|err| QueueError::Remote(err.to_string()))
    }

    pub async fn empty(&self, queue: &str) -> Result<(), QueueError> {
        self.checked_call("empty", vec![json!(queue)]).await?;
        Ok(())
    }

    pub async fn list_queues(&self) -> Result<Vec<String>, QueueError> {
        let reply = self.checked_call("list_queues", vec![]).await?;
        serde_json::from_value(reply).map_err(|err| QueueError::Remote(err.to_string()))
    }

    pub async fn remove_queues(&self, queues: &[String]) -> Result<(), QueueError> {
        let args = queues.iter().map(|queue| json!(queue)).collect();
        self.checked_call("remove_queues", args).await?;
        Ok(())
    }

    pub async fn remove_queue(&self, queue: &str) -> Result<(), QueueError> {
        let queues = [queue.to_string()];
        self.remove_queues(&queues).await
    }
}

/// Client for the broker's replication endpoint. One connection is plenty:
/// the replicator is the only caller and strictly serial.
pub struct ReplicationClient {
    addr: String,
    conn: Mutex<Option<Connection>>,
}

impl ReplicationClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn: Mutex::new(None),
        }
    }

    async fn request(&self, payload: &[u8]) -> Result<Vec<u8>, QueueError> {
        let mut slot = self.conn.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => Connection::dial(&self.addr).await?,
        };
        match conn.call(payload).await {
            Ok(reply) => {
                *slot = Some(conn);
                Ok(reply)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Pull the pending backlog. Returns the raw reply payload (the bytes
    /// the signature is computed over) alongside the decoded operations,
    /// or None when the broker reports nothing pending.
    pub async fn fetch_backlog(&self) -> Result<Option<(Vec<u8>, Vec<Operation>)>, QueueError> {
        let payload = protocol::encode(&BACKLOG_REQUEST.to_string())
            .map_err(|err| QueueError::Remote(err.to_string()))?;
        let reply = self.request(&payload).await?;

        if let Ok(operations) = protocol::decode::<Vec<Operation>>(&reply) {
            if operations.is_empty() {
                return Ok(None);
            }
            return Ok(Some((reply, operations)));
        }
        match protocol::decode::<Value>(&reply) {
            Ok(Value::Bool(false)) | Ok(Value::Null) => Ok(None),
            Ok(other) => Err(QueueError::Remote(format!(
                "unexpected backlog reply: {other}"
            ))),
            Err(err) => Err(QueueError::Remote(err.to_string())),
        }
    }

    /// Acknowledge an applied backlog by signature. Returns whether the
    /// broker still held the matching snapshot.
    pub async fn ack(&self, signature: &str) -> Result<bool, QueueError> {
        let payload = protocol::encode(&format!("{ACK_PREFIX}{signature}"))
            .map_err(|err| QueueError::Remote(err.to_string()))?;
        let reply = self.request(&payload).await?;
        protocol::decode(&reply).map_err(|err| QueueError::Remote(err.to_string()))
    }
}
