//! Channel-backed frame transport

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Capacity of the frame channels on each side of an I/O task
pub const CHANNEL_CAPACITY: usize = 64;

/// Handle to a connection that carries whole frames.
///
/// Frames are sent/received via the channels, and an internal task (if
/// any) handles the actual I/O. Dropping `outgoing` asks the task to close
/// the connection gracefully; `incoming` yields `None` once the peer is gone.
pub struct FramedConnection {
    /// Send frames to the peer.
    pub outgoing: mpsc::Sender<Bytes>,
    /// Receive frames from the peer.
    pub incoming: mpsc::Receiver<Bytes>,
    /// Abort handle to stop the I/O task.
    pub(crate) abort_handle: Option<AbortHandle>,
}

impl FramedConnection {
    pub fn new(
        outgoing: mpsc::Sender<Bytes>,
        incoming: mpsc::Receiver<Bytes>,
        abort_handle: Option<AbortHandle>,
    ) -> Self {
        Self {
            outgoing,
            incoming,
            abort_handle,
        }
    }

    /// Two connections wired back to back, with no I/O task.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Self::new(a_tx, b_rx, None), Self::new(b_tx, a_rx, None))
    }

    /// Tear the connection down immediately.
    pub fn close(self) {
        if let Some(handle) = self.abort_handle {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for FramedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedConnection")
            .field("closed", &self.outgoing.is_closed())
            .field("io_task", &self.abort_handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_is_cross_wired() {
        let (a, mut b) = FramedConnection::pair();

        a.outgoing.send(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(b.incoming.recv().await.unwrap(), Bytes::from_static(b"ping"));

        b.outgoing.send(Bytes::from_static(b"pong")).await.unwrap();
        let FramedConnection { mut incoming, .. } = a;
        assert_eq!(incoming.recv().await.unwrap(), Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn test_close_is_observed_by_peer() {
        let (a, mut b) = FramedConnection::pair();
        a.close();

        assert!(b.incoming.recv().await.is_none());
        assert!(b.outgoing.send(Bytes::new()).await.is_err());
    }
}
