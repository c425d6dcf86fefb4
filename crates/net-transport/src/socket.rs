//! Content-Length framing over byte streams (TCP, Unix sockets)
//!
//! Each frame is `Content-Length: N\r\n\r\n` followed by exactly N bytes.
//! Any deviation from that header closes the connection.

use bytes::Bytes;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{CHANNEL_CAPACITY, FramedConnection, TransportError, TransportResult};

/// Largest accepted frame payload
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

const HEADER_PREFIX: &str = "Content-Length: ";
const MAX_HEADER_LINE: u64 = 64;

/// Connect over TCP.
pub async fn connect_tcp(addr: impl ToSocketAddrs) -> TransportResult<FramedConnection> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    stream.set_nodelay(true)?;
    Ok(framed_stream(stream))
}

/// Connect to a local Unix socket.
#[cfg(unix)]
pub async fn connect_unix(path: impl AsRef<std::path::Path>) -> TransportResult<FramedConnection> {
    let stream = tokio::net::UnixStream::connect(path)
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    Ok(framed_stream(stream))
}

/// Wrap a byte stream, spawning the task that does its I/O.
pub fn framed_stream<S>(stream: S) -> FramedConnection
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (outgoing_tx, outgoing_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (incoming_tx, incoming_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let handle = tokio::spawn(run_stream(reader, writer, outgoing_rx, incoming_tx));

    FramedConnection::new(outgoing_tx, incoming_rx, Some(handle.abort_handle()))
}

async fn run_stream<R, W>(
    reader: R,
    mut writer: W,
    mut outgoing: mpsc::Receiver<Bytes>,
    incoming: mpsc::Sender<Bytes>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Reading a frame is not cancel safe, so the read loop stays pinned
    // across select iterations instead of being restarted.
    let read_loop = read_loop(BufReader::new(reader), incoming);
    tokio::pin!(read_loop);

    loop {
        tokio::select! {
            _ = &mut read_loop => break,
            frame = outgoing.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = write_frame(&mut writer, &frame).await {
                        warn!("Socket write failed: {}", e);
                        break;
                    }
                }
                None => {
                    let _ = writer.shutdown().await;
                    break;
                }
            },
        }
    }

    debug!("Socket connection task ended");
}

async fn read_loop<R>(mut reader: R, incoming: mpsc::Sender<Bytes>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if incoming.send(frame).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("Peer closed the socket");
                break;
            }
            Err(e) => {
                warn!("Dropping socket connection: {}", e);
                break;
            }
        }
    }
}

/// Read one frame, or `None` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> TransportResult<Option<Bytes>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if (&mut *reader).take(MAX_HEADER_LINE).read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let len = parse_header(&line)?;

    let mut blank = String::new();
    (&mut *reader).take(MAX_HEADER_LINE).read_line(&mut blank).await?;
    if blank != "\r\n" {
        return Err(TransportError::Framing(
            "expected blank line after header".into(),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Bytes::from(payload)))
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let header = format!("{HEADER_PREFIX}{}\r\n\r\n", payload.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

fn parse_header(line: &str) -> TransportResult<usize> {
    let value = line
        .strip_prefix(HEADER_PREFIX)
        .and_then(|rest| rest.strip_suffix("\r\n"))
        .ok_or_else(|| TransportError::Framing(format!("bad header line {line:?}")))?;

    let len: usize = value
        .parse()
        .map_err(|_| TransportError::Framing(format!("bad content length {value:?}")))?;

    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_a_duplex_stream() {
        let (a, b) = tokio::io::duplex(4096);
        let a = framed_stream(a);
        let mut b = framed_stream(b);

        a.outgoing.send(Bytes::from_static(b"first")).await.unwrap();
        a.outgoing.send(Bytes::new()).await.unwrap();
        a.outgoing.send(Bytes::from_static(b"third")).await.unwrap();

        assert_eq!(b.incoming.recv().await.unwrap(), Bytes::from_static(b"first"));
        assert_eq!(b.incoming.recv().await.unwrap(), Bytes::new());
        assert_eq!(b.incoming.recv().await.unwrap(), Bytes::from_static(b"third"));
    }

    #[tokio::test]
    async fn test_wire_format() {
        let mut out = Vec::new();
        write_frame(&mut out, b"{}").await.unwrap();
        assert_eq!(out, b"Content-Length: 2\r\n\r\n{}");
    }

    #[tokio::test]
    async fn test_read_frame_accepts_exact_format() {
        let mut input: &[u8] = b"Content-Length: 5\r\n\r\nhelloContent-Length: 0\r\n\r\n";
        assert_eq!(
            read_frame(&mut input).await.unwrap(),
            Some(Bytes::from_static(b"hello"))
        );
        assert_eq!(read_frame(&mut input).await.unwrap(), Some(Bytes::new()));
        assert_eq!(read_frame(&mut input).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_frame_rejects_bad_headers() {
        for input in [
            &b"Content-Type: 5\r\n\r\nhello"[..],
            b"Content-Length: five\r\n\r\nhello",
            b"Content-Length: 5\n\nhello",
            b"Content-Length: 5\r\nX-Extra: 1\r\n\r\nhello",
        ] {
            let mut input = input;
            assert!(read_frame(&mut input).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_oversized_frames_rejected() {
        let mut input: &[u8] = b"Content-Length: 1048577\r\n\r\n";
        assert!(matches!(
            read_frame(&mut input).await,
            Err(TransportError::FrameTooLarge { .. })
        ));

        let mut out = Vec::new();
        let payload = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            write_frame(&mut out, &payload).await,
            Err(TransportError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_an_error() {
        let mut input: &[u8] = b"Content-Length: 10\r\n\r\nshort";
        assert!(read_frame(&mut input).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_peer_closes_connection() {
        let (a, mut raw) = tokio::io::duplex(1024);
        let mut conn = framed_stream(a);

        raw.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        assert!(conn.incoming.recv().await.is_none());
    }
}
