//! Connection handling for the broker's two endpoints.
//!
//! Each connection runs one request/reply loop: read a frame, process,
//! write the reply, flush only once no further requests are buffered so
//! pipelined clients pay a single flush per burst. Malformed payloads
//! answer with a null reply; nothing a client sends can take the loop down.

use std::io;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::warn;

use crate::protocol::{
    self, decode_request, read_frame, write_frame, WireRequest, ACK_PREFIX, BACKLOG_REQUEST,
};

use super::broker::Broker;

const BUFFER_CAPACITY: usize = 64 * 1024;

/// Encode a reply, falling back to the MessagePack nil byte if the value
/// somehow cannot be serialized.
fn encode_reply<T: Serialize>(value: &T) -> Vec<u8> {
    protocol::encode(value).unwrap_or_else(|err| {
        warn!(error = %err, "reply serialization failed");
        vec![0xc0]
    })
}

/// Serve item traffic: every request is an envelope dispatched against the
/// broker's in-memory backend.
pub async fn handle_primary<R, W>(reader: R, writer: W, broker: Arc<Broker>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, reader);
    let mut writer = BufWriter::with_capacity(BUFFER_CAPACITY, writer);
    let mut payload = Vec::with_capacity(8192);

    while read_frame(&mut reader, &mut payload).await? {
        let reply = match decode_request(&payload) {
            Some(WireRequest::Call(envelope)) => broker.dispatch(envelope),
            // Control strings mean nothing here; malformed payloads are a
            // void request either way.
            Some(WireRequest::Control(_)) | None => Value::Null,
        };

        write_frame(&mut writer, &encode_reply(&reply)).await?;
        if protocol::buffer_is_empty(&reader) {
            writer.flush().await?;
        }
    }

    writer.flush().await?;
    Ok(())
}

/// Serve the replication handshake: BACKLOG hands the pending backlog off,
/// ACK retires a held snapshot. Ordinary envelopes are dispatched too, so
/// the endpoint stays a full peer of the primary one.
pub async fn handle_replication<R, W>(reader: R, writer: W, broker: Arc<Broker>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, reader);
    let mut writer = BufWriter::with_capacity(BUFFER_CAPACITY, writer);
    let mut payload = Vec::with_capacity(8192);

    while read_frame(&mut reader, &mut payload).await? {
        let reply_payload = match decode_request(&payload) {
            Some(WireRequest::Control(control)) => handle_control(&control, &broker),
            Some(WireRequest::Call(envelope)) => encode_reply(&broker.dispatch(envelope)),
            None => encode_reply(&Value::Null),
        };

        write_frame(&mut writer, &reply_payload).await?;
        if protocol::buffer_is_empty(&reader) {
            writer.flush().await?;
        }
    }

    writer.flush().await?;
    Ok(())
}

fn handle_control(control: &str, broker: &Broker) -> Vec<u8> {
    if control == BACKLOG_REQUEST {
        match broker.take_backlog() {
            // The payload is already the serialized operation list.
            Some(snapshot) => snapshot.payload,
            None => encode_reply(&false),
        }
    } else if let Some(signature) = control.strip_prefix(ACK_PREFIX) {
        encode_reply(&broker.ack(signature.trim()))
    } else {
        encode_reply(&false)
    }
}
