//! Bridges axum WebSocket connections onto [`FramedConnection`]

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use net_transport::{CHANNEL_CAPACITY, FramedConnection};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One binary message per frame, same as the client side.
pub fn framed_socket(socket: WebSocket) -> FramedConnection {
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (incoming_tx, incoming_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = outgoing_rx.recv() => match frame {
                    Some(frame) => {
                        if ws_tx.send(Message::Binary(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = ws_tx.close().await;
                        break;
                    }
                },

                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Binary(data))) => {
                        if incoming_tx.send(data).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Text(_))) => {
                        warn!("Text WebSocket message from controller, closing");
                        break;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                },
            }
        }
        debug!("WebSocket bridge ended");
    });

    FramedConnection::new(outgoing_tx, incoming_rx, Some(handle.abort_handle()))
}
