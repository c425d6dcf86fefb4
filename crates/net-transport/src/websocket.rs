//! WebSocket client transport
//!
//! One binary WebSocket message carries one frame.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::{WebSocketStream, connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use crate::{CHANNEL_CAPACITY, FramedConnection, TransportError, TransportResult};

/// Connect to a WebSocket endpoint such as `ws://127.0.0.1:9002`.
pub async fn connect_websocket(url: &str) -> TransportResult<FramedConnection> {
    info!("Connecting to WebSocket endpoint: {}", url);

    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

    debug!("WebSocket connected");
    Ok(framed_websocket(ws_stream))
}

/// Wrap an established WebSocket, spawning the task that does its I/O.
pub fn framed_websocket<S>(ws_stream: WebSocketStream<S>) -> FramedConnection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (outgoing_tx, outgoing_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (incoming_tx, incoming_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let handle = tokio::spawn(run_websocket(ws_stream, outgoing_rx, incoming_tx));

    FramedConnection::new(outgoing_tx, incoming_rx, Some(handle.abort_handle()))
}

async fn run_websocket<S>(
    ws_stream: WebSocketStream<S>,
    mut outgoing: mpsc::Receiver<Bytes>,
    incoming: mpsc::Sender<Bytes>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    loop {
        tokio::select! {
            // Outgoing: application -> peer
            frame = outgoing.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = ws_tx.send(Message::Binary(frame)).await {
                        warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                None => {
                    let _ = ws_tx.close().await;
                    break;
                }
            },

            // Incoming: peer -> application
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    if incoming.send(data).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Text(_))) => {
                    warn!("Unexpected text WebSocket message, closing");
                    break;
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("WebSocket closed by peer");
                    break;
                }
                Some(Ok(_)) => {} // ping/pong and raw frames
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            },
        }
    }

    debug!("WebSocket connection task ended");
}
