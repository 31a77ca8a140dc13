//! Wire protocol: length-prefixed MessagePack frames.
//!
//! Frame format: [4 bytes length (big-endian u32)] [N bytes MessagePack
//! data]. Requests are either a `[method, [args...]]` envelope or, on the
//! replication endpoint, a bare control string (`BACKLOG`, `ACK <hex>`).
//! Replies are a single serialized value of whatever type the operation
//! returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Sanity cap on a single frame: 16MB.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Control request pulling the pending backlog.
pub const BACKLOG_REQUEST: &str = "BACKLOG";
/// Prefix of a backlog acknowledgment; the rest is the hex signature.
pub const ACK_PREFIX: &str = "ACK ";

/// A `[method, [args...]]` request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope(pub String, pub Vec<Value>);

impl Envelope {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self(method.into(), args)
    }

    pub fn method(&self) -> &str {
        &self.0
    }

    pub fn args(&self) -> &[Value] {
        &self.1
    }
}

/// One backlog entry: an operation exactly as dispatched on the primary
/// endpoint.
pub type Operation = Envelope;

/// A decoded request payload.
#[derive(Debug)]
pub enum WireRequest {
    /// A bare string (the replication handshake).
    Control(String),
    /// A method call envelope.
    Call(Envelope),
}

/// Decode a request payload. None means the payload was malformed; the
/// server answers those with a null reply instead of dropping the
/// connection.
pub fn decode_request(payload: &[u8]) -> Option<WireRequest> {
    if let Ok(envelope) = rmp_serde::from_slice::<Envelope>(payload) {
        return Some(WireRequest::Call(envelope));
    }
    if let Ok(control) = rmp_serde::from_slice::<String>(payload) {
        return Some(WireRequest::Control(control));
    }
    None
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec(value)
}

pub fn decode<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T, rmp_serde::decode::Error> {
    rmp_serde::from_slice(payload)
}

/// Read one frame into `buf`. Returns false on a clean EOF at a frame
/// boundary.
pub async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }

    buf.clear();
    buf.resize(len, 0);
    reader.read_exact(buf).await?;
    Ok(true)
}

/// Write one length-prefixed frame. The caller decides when to flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    Ok(())
}

/// True when no more request frames are already buffered; used to batch
/// flushes under pipelining.
pub fn buffer_is_empty<R: AsyncRead>(reader: &BufReader<R>) -> bool {
    reader.buffer().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_envelopes() {
        let payload = encode(&Envelope::new("add", vec![json!("queue"), json!(1)])).unwrap();
        match decode_request(&payload) {
            Some(WireRequest::Call(envelope)) => {
                assert_eq!(envelope.method(), "add");
                assert_eq!(envelope.args(), &[json!("queue"), json!(1)]);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn decodes_control_strings() {
        let payload = encode(&BACKLOG_REQUEST.to_string()).unwrap();
        match decode_request(&payload) {
            Some(WireRequest::Control(control)) => assert_eq!(control, BACKLOG_REQUEST),
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_request(&[0x92, 0x01, 0x02]).is_none()); // [1, 2]
        assert!(decode_request(&[0xff, 0xff]).is_none());
    }

    #[tokio::test]
    async fn frames_round_trip() {
        let (client, server) = tokio::io::duplex(4096);
        let (_, mut client_writer) = tokio::io::split(client);
        let (server_reader, _) = tokio::io::split(server);
        let mut reader = BufReader::new(server_reader);

        let payload = encode(&Envelope::new("size", vec![json!("q")])).unwrap();
        write_frame(&mut client_writer, &payload).await.unwrap();
        drop(client_writer);

        let mut buf = Vec::new();
        assert!(read_frame(&mut reader, &mut buf).await.unwrap());
        assert_eq!(buf, payload);
        assert!(!read_frame(&mut reader, &mut buf).await.unwrap());
    }

    #[tokio::test]
    async fn oversize_frames_error() {
        let (client, server) = tokio::io::duplex(4096);
        let (_, mut client_writer) = tokio::io::split(client);
        let (server_reader, _) = tokio::io::split(server);
        let mut reader = BufReader::new(server_reader);

        let huge = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        tokio::io::AsyncWriteExt::write_all(&mut client_writer, &huge)
            .await
            .unwrap();

        let mut buf = Vec::new();
        assert!(read_frame(&mut reader, &mut buf).await.is_err());
    }
}
