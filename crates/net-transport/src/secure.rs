//! Encrypted channel over a framed connection
//!
//! Drives the password handshake from `crypto-session` over a
//! [`FramedConnection`] and then carries one encrypted frame per message.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crypto_session::{
    ClientHandshake, DecryptStream, EncryptStream, HandshakeError, HandshakeResult,
    HandshakeState, KdfParams, Role, ServerHandshake, SessionStreams,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{FramedConnection, TransportError, TransportResult};

/// Handshake settings shared by both roles
#[derive(Debug, Clone, Copy, Default)]
pub struct HandshakeOptions {
    /// Argon2id cost; must match the peer's
    pub kdf: KdfParams,
    /// Give up (and close the connection) if the handshake takes longer
    pub timeout: Option<Duration>,
}

/// Tracks the handshake state and deadline around every wait on the peer
/// or the KDF. Any error moves it to [`HandshakeState::Failed`].
struct Driver<'a> {
    conn: &'a mut FramedConnection,
    deadline: Option<Instant>,
    state: HandshakeState,
}

impl<'a> Driver<'a> {
    fn new(conn: &'a mut FramedConnection, timeout: Option<Duration>, state: HandshakeState) -> Self {
        Self {
            conn,
            deadline: timeout.map(|t| Instant::now() + t),
            state,
        }
    }

    fn advance(&mut self, next: HandshakeState) {
        debug!(from = %self.state, to = %next, "Handshake progress");
        self.state = next;
    }

    fn track<T>(&mut self, result: HandshakeResult<T>) -> HandshakeResult<T> {
        if result.is_err() {
            self.state = HandshakeState::Failed;
        }
        result
    }

    async fn within<F: Future>(&self, fut: F) -> HandshakeResult<F::Output> {
        let state = self.state;
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| HandshakeError::TimedOut { state }),
            None => Ok(fut.await),
        }
    }

    async fn recv(&mut self) -> HandshakeResult<Bytes> {
        let state = self.state;
        let deadline = self.deadline;
        let next = self.conn.incoming.recv();
        let frame = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, next)
                .await
                .map_err(|_| HandshakeError::TimedOut { state }),
            None => Ok(next.await),
        };
        let result = frame.and_then(|frame| frame.ok_or(HandshakeError::TransportClosed { state }));
        self.track(result)
    }

    async fn send(&mut self, message: Vec<u8>) -> HandshakeResult<()> {
        let state = self.state;
        let sent = self.within(self.conn.outgoing.send(Bytes::from(message))).await;
        let result = sent.and_then(|r| r.map_err(|_| HandshakeError::TransportClosed { state }));
        self.track(result)
    }

    /// Run a KDF-bound step off the async runtime.
    async fn blocking<T, F>(&mut self, step: F) -> HandshakeResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> HandshakeResult<T> + Send + 'static,
    {
        let joined = self.within(tokio::task::spawn_blocking(step)).await;
        let result = joined.and_then(|r| {
            r.unwrap_or_else(|e| Err(HandshakeError::KeyDerivation(e.to_string())))
        });
        self.track(result)
    }
}

fn owned_password(password: &SecretString) -> SecretString {
    SecretString::from(password.expose_secret())
}

async fn initiate(
    driver: &mut Driver<'_>,
    password: &SecretString,
    options: &HandshakeOptions,
) -> HandshakeResult<SessionStreams> {
    let password = owned_password(password);
    let kdf = options.kdf;

    let (client, hello) = driver
        .blocking(move || ClientHandshake::start(&password, &kdf))
        .await?;
    driver.send(hello.to_bytes()).await?;
    debug!("ClientHello sent");

    let server_hello = driver.recv().await?;
    let finished = client.finish(&server_hello);
    let (streams, ready) = driver.track(finished)?;
    driver.advance(HandshakeState::AwaitingClientReady);
    driver.send(ready.to_bytes()).await?;
    debug!("ClientReady sent");

    driver.advance(HandshakeState::Established);
    Ok(streams)
}

async fn respond(
    driver: &mut Driver<'_>,
    password: &SecretString,
    options: &HandshakeOptions,
) -> HandshakeResult<SessionStreams> {
    let password = owned_password(password);
    let kdf = options.kdf;

    let client_hello = driver.recv().await?;
    let (server, reply) = driver
        .blocking(move || ServerHandshake::respond(&password, &kdf, &client_hello))
        .await?;
    driver.advance(server.state());
    driver.send(reply.to_bytes()).await?;
    debug!("ServerHello sent");

    let client_ready = driver.recv().await?;
    let finished = server.finish(&client_ready);
    let streams = driver.track(finished)?;
    driver.advance(HandshakeState::Established);
    Ok(streams)
}

/// An established encrypted channel, ready to be split into halves.
pub struct SecureChannel {
    conn: FramedConnection,
    streams: SessionStreams,
    role: Role,
}

impl SecureChannel {
    /// Run the initiator side of the handshake.
    ///
    /// On any failure the connection is closed before returning.
    pub async fn connect(
        mut conn: FramedConnection,
        password: &SecretString,
        options: &HandshakeOptions,
    ) -> TransportResult<Self> {
        let mut driver = Driver::new(&mut conn, options.timeout, HandshakeState::AwaitingServerHello);
        let result = initiate(&mut driver, password, options).await;
        let state = driver.state;

        match result {
            Ok(streams) => {
                info!(%state, "Secure channel established (initiator)");
                Ok(Self {
                    conn,
                    streams,
                    role: Role::Initiator,
                })
            }
            Err(e) => {
                debug!(%state, "Initiator handshake failed: {}", e);
                conn.close();
                Err(e.into())
            }
        }
    }

    /// Run the responder side of the handshake.
    ///
    /// A ClientHello that does not open under our password gets no reply;
    /// the connection is simply closed.
    pub async fn accept(
        mut conn: FramedConnection,
        password: &SecretString,
        options: &HandshakeOptions,
    ) -> TransportResult<Self> {
        let mut driver = Driver::new(&mut conn, options.timeout, HandshakeState::AwaitingClientHello);
        let result = respond(&mut driver, password, options).await;
        let state = driver.state;

        match result {
            Ok(streams) => {
                info!(%state, "Secure channel established (responder)");
                Ok(Self {
                    conn,
                    streams,
                    role: Role::Responder,
                })
            }
            Err(e) => {
                debug!(%state, "Responder handshake failed: {}", e);
                conn.close();
                Err(e.into())
            }
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Split into a cloneable sender and a single receiver.
    pub fn split(self) -> (SecureSender, SecureReceiver) {
        let FramedConnection {
            outgoing,
            incoming,
            abort_handle,
        } = self.conn;
        let SessionStreams { send, recv } = self.streams;

        let half = Arc::new(Mutex::new(SendHalf {
            stream: send,
            outgoing: Some(outgoing),
        }));
        let torn_down = Arc::new(watch::Sender::new(false));

        (
            SecureSender {
                half: half.clone(),
                torn_down: torn_down.clone(),
            },
            SecureReceiver {
                stream: recv,
                incoming,
                sender: half,
                torn_down,
                abort_handle,
                failed: false,
            },
        )
    }
}

struct SendHalf {
    stream: EncryptStream,
    outgoing: Option<mpsc::Sender<Bytes>>,
}

async fn until_torn_down(torn_down: &mut watch::Receiver<bool>) {
    let _ = torn_down.wait_for(|down| *down).await;
}

fn torn_down_error() -> TransportError {
    TransportError::ConnectionClosed("connection torn down".into())
}

/// Sending half of a [`SecureChannel`].
///
/// Clones share one lock held across encryption and enqueueing, so frames
/// reach the wire in the order their nonces were assigned. A send blocked on
/// a full channel fails as soon as the receiving half tears the connection
/// down.
#[derive(Clone)]
pub struct SecureSender {
    half: Arc<Mutex<SendHalf>>,
    torn_down: Arc<watch::Sender<bool>>,
}

impl SecureSender {
    pub async fn send(&self, plaintext: &[u8]) -> TransportResult<()> {
        let mut torn_down = self.torn_down.subscribe();
        if *torn_down.borrow_and_update() {
            return Err(torn_down_error());
        }

        let mut half = tokio::select! {
            half = self.half.lock() => half,
            _ = until_torn_down(&mut torn_down) => return Err(torn_down_error()),
        };
        let SendHalf { stream, outgoing } = &mut *half;

        let outgoing = outgoing
            .as_ref()
            .ok_or_else(|| TransportError::ConnectionClosed("channel closed".into()))?;
        let frame = stream.encrypt(plaintext)?;

        tokio::select! {
            sent = outgoing.send(Bytes::from(frame)) => {
                sent.map_err(|_| TransportError::ConnectionClosed("peer went away".into()))
            }
            _ = until_torn_down(&mut torn_down) => Err(torn_down_error()),
        }
    }

    /// Close the outgoing direction; the peer sees end of stream.
    pub async fn close(&self) {
        self.half.lock().await.outgoing.take();
    }

    pub async fn is_closed(&self) -> bool {
        if *self.torn_down.borrow() {
            return true;
        }
        match &self.half.lock().await.outgoing {
            Some(outgoing) => outgoing.is_closed(),
            None => true,
        }
    }
}

/// Receiving half of a [`SecureChannel`].
pub struct SecureReceiver {
    stream: DecryptStream,
    incoming: mpsc::Receiver<Bytes>,
    sender: Arc<Mutex<SendHalf>>,
    torn_down: Arc<watch::Sender<bool>>,
    abort_handle: Option<AbortHandle>,
    failed: bool,
}

impl SecureReceiver {
    /// Next decrypted frame, or `None` once the peer closed cleanly.
    ///
    /// A frame that fails to decrypt tears down both directions; this and
    /// every later call return [`TransportError::Decryption`].
    pub async fn recv(&mut self) -> TransportResult<Option<Vec<u8>>> {
        if self.failed {
            return Err(TransportError::Decryption);
        }

        let Some(frame) = self.incoming.recv().await else {
            return Ok(None);
        };

        match self.stream.decrypt(&frame) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(e) => {
                warn!(
                    "Frame {} failed to decrypt ({}), closing connection",
                    self.stream.frames_received(),
                    e
                );
                self.failed = true;
                self.shutdown().await;
                Err(TransportError::Decryption)
            }
        }
    }

    async fn shutdown(&mut self) {
        // Wake blocked senders first; they hold the send lock while waiting.
        self.torn_down.send_replace(true);
        if let Some(handle) = self.abort_handle.take() {
            handle.abort();
        }
        self.incoming.close();
        self.sender.lock().await.outgoing.take();
    }
}
