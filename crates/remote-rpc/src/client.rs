//! Initiator-side RPC client
//!
//! One task owns the [`SecureReceiver`] and routes every incoming frame:
//! responses complete the pending call with the same id, notifications go
//! to the subscribers of their method.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use net_transport::{
    FramedConnection, HandshakeOptions, SecureChannel, SecureReceiver, SecureSender,
    TransportResult,
};
use parking_lot::RwLock;
use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared_protocol::{
    CURRENT_SCENE_CHANGED, CurrentSceneChanged, HELLO, IdParams, OUTPUT_STATE_CHANGED,
    OUTPUTS_GET, OUTPUTS_SET_DELAY, OUTPUTS_START, OUTPUTS_STOP, Output, OutputState,
    OutputStateChanged, RpcMessage, SCENES_ACTIVATE, SCENES_GET, Scene, SetDelayParams,
};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{IdSequence, RpcError, RpcResult, Subscribers, Subscription};

/// Default per-call timeout
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// Fail a call with [`RpcError::Timeout`] if no response arrives in time.
    /// `None` waits until the session ends.
    pub call_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
        }
    }
}

#[derive(Debug, Clone)]
enum SessionState {
    Waiting,
    Ready,
    Closed(RpcError),
}

type PendingCalls = DashMap<String, oneshot::Sender<RpcResult<Value>>>;

struct Shared {
    sender: SecureSender,
    ids: IdSequence,
    pending: PendingCalls,
    subscribers: DashMap<String, Subscribers<Value>>,
    closed: RwLock<Option<RpcError>>,
    state: watch::Sender<SessionState>,
}

impl Shared {
    fn closed_reason(&self) -> Option<RpcError> {
        self.closed.read().clone()
    }

    fn dispatch(&self, frame: &[u8]) {
        let message = match RpcMessage::from_slice(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed message: {}", e);
                return;
            }
        };

        match message {
            RpcMessage::Notification { method, params } => {
                self.notify(&method, params.unwrap_or(Value::Null))
            }
            RpcMessage::Request { method, params, .. } => self.notify(&method, params),
            RpcMessage::SuccessResponse { id, result } => self.complete(&id, Ok(result)),
            RpcMessage::ErrorResponse { id, error } => {
                self.complete(&id, Err(RpcError::Remote(error)))
            }
        }
    }

    fn notify(&self, method: &str, params: Value) {
        if method == HELLO {
            self.state.send_if_modified(|state| {
                if matches!(state, SessionState::Waiting) {
                    *state = SessionState::Ready;
                    true
                } else {
                    false
                }
            });
        }

        // Emit outside the map guard so callbacks may subscribe.
        let subscribers = self.subscribers.get(method).map(|s| s.clone());
        match subscribers {
            Some(subscribers) => subscribers.emit(&params),
            None => debug!("No subscribers for {}", method),
        }
    }

    fn complete(&self, id: &str, result: RpcResult<Value>) {
        match self.pending.remove(id) {
            Some((_, tx)) => {
                let _ = tx.send(result);
            }
            None => debug!("Dropping response for unknown id {}", id),
        }
    }

    fn fail_all(&self, reason: RpcError) {
        *self.closed.write() = Some(reason.clone());
        self.state.send_replace(SessionState::Closed(reason.clone()));

        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(reason.clone()));
            }
        }
    }
}

/// Removes a pending call when its future completes or is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingCalls,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

async fn receive_loop(shared: Arc<Shared>, mut receiver: SecureReceiver) {
    let reason = loop {
        match receiver.recv().await {
            Ok(Some(frame)) => shared.dispatch(&frame),
            Ok(None) => break RpcError::TransportClosed,
            Err(e) => break RpcError::from(e),
        }
    };

    info!("Session ended: {}", reason);
    shared.fail_all(reason);
}

/// RPC client over an established secure channel.
pub struct RpcClient {
    shared: Arc<Shared>,
    options: ClientOptions,
    receive_task: JoinHandle<()>,
}

impl RpcClient {
    /// Start routing messages for an established channel.
    pub fn new(channel: SecureChannel, options: ClientOptions) -> Self {
        let (sender, receiver) = channel.split();
        let (state, _) = watch::channel(SessionState::Waiting);

        let shared = Arc::new(Shared {
            sender,
            ids: IdSequence::new(),
            pending: DashMap::new(),
            subscribers: DashMap::new(),
            closed: RwLock::new(None),
            state,
        });
        let receive_task = tokio::spawn(receive_loop(shared.clone(), receiver));

        Self {
            shared,
            options,
            receive_task,
        }
    }

    /// Handshake as initiator over `conn`, then start the client.
    pub async fn connect(
        conn: FramedConnection,
        password: &SecretString,
        handshake: &HandshakeOptions,
        options: ClientOptions,
    ) -> TransportResult<Self> {
        let channel = SecureChannel::connect(conn, password, handshake).await?;
        Ok(Self::new(channel, options))
    }

    /// Resolves once the server's `hello` arrived.
    pub async fn ready(&self) -> RpcResult<()> {
        let mut state = self.shared.state.subscribe();
        let state = state
            .wait_for(|s| !matches!(s, SessionState::Waiting))
            .await
            .map_err(|_| RpcError::TransportClosed)?;

        match &*state {
            SessionState::Closed(reason) => Err(reason.clone()),
            _ => Ok(()),
        }
    }

    /// Resolves with the reason once the session has ended.
    pub async fn closed(&self) -> RpcError {
        let mut state = self.shared.state.subscribe();
        let reason = match state
            .wait_for(|s| matches!(s, SessionState::Closed(_)))
            .await
        {
            Ok(state) => match &*state {
                SessionState::Closed(reason) => reason.clone(),
                _ => RpcError::TransportClosed,
            },
            Err(_) => RpcError::TransportClosed,
        };
        reason
    }

    /// Send a request and wait for its response.
    pub async fn call(&self, method: &str, params: Value) -> RpcResult<Value> {
        if let Some(reason) = self.shared.closed_reason() {
            return Err(reason);
        }

        let id = self.shared.ids.next();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.shared.pending,
            id: id.clone(),
        };

        // The session may have failed between the check and the insert.
        if let Some(reason) = self.shared.closed_reason() {
            return Err(reason);
        }

        debug!(%id, method, "Sending call");
        let request = RpcMessage::request(id, method, params);
        self.shared.sender.send(&request.to_vec()).await?;

        let response = match self.options.call_timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx)
                .await
                .map_err(|_| RpcError::Timeout {
                    method: method.to_string(),
                })?,
            None => rx.await,
        };

        response.unwrap_or(Err(RpcError::TransportClosed))
    }

    async fn call_typed<P, T>(&self, method: &str, params: P) -> RpcResult<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let params =
            serde_json::to_value(params).map_err(|e| RpcError::Serialization(e.to_string()))?;
        let result = self.call(method, params).await?;

        serde_json::from_value(result).map_err(|e| RpcError::InvalidResult {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    pub async fn get_outputs(&self) -> RpcResult<HashMap<String, Output>> {
        self.call_typed(OUTPUTS_GET, Value::Null).await
    }

    pub async fn get_scenes(&self) -> RpcResult<HashMap<String, Scene>> {
        self.call_typed(SCENES_GET, Value::Null).await
    }

    pub async fn set_delay(&self, id: &str, seconds: i64) -> RpcResult<()> {
        let params = SetDelayParams {
            id: id.to_string(),
            seconds,
        };
        self.call_ignoring_result(OUTPUTS_SET_DELAY, params).await
    }

    pub async fn start_output(&self, id: &str) -> RpcResult<()> {
        self.call_ignoring_result(OUTPUTS_START, IdParams { id: id.to_string() })
            .await
    }

    pub async fn stop_output(&self, id: &str) -> RpcResult<()> {
        self.call_ignoring_result(OUTPUTS_STOP, IdParams { id: id.to_string() })
            .await
    }

    pub async fn activate_scene(&self, id: &str) -> RpcResult<()> {
        self.call_ignoring_result(SCENES_ACTIVATE, IdParams { id: id.to_string() })
            .await
    }

    async fn call_ignoring_result<P: Serialize>(&self, method: &str, params: P) -> RpcResult<()> {
        let _: Value = self.call_typed(method, params).await?;
        Ok(())
    }

    /// Register a callback for every notification of `method`.
    pub fn subscribe(
        &self,
        method: &str,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared
            .subscribers
            .entry(method.to_string())
            .or_default()
            .subscribe(callback)
    }

    pub fn on_hello(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.subscribe(HELLO, move |_| callback())
    }

    pub fn on_output_state_changed(
        &self,
        callback: impl Fn(&str, OutputState) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(OUTPUT_STATE_CHANGED, move |params| {
            match serde_json::from_value::<OutputStateChanged>(params.clone()) {
                Ok(change) => callback(&change.id, change.state),
                Err(e) => warn!("Ignoring malformed {}: {}", OUTPUT_STATE_CHANGED, e),
            }
        })
    }

    pub fn on_current_scene_changed(
        &self,
        callback: impl Fn(&str) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(CURRENT_SCENE_CHANGED, move |params| {
            match serde_json::from_value::<CurrentSceneChanged>(params.clone()) {
                Ok(change) => callback(&change.id),
                Err(e) => warn!("Ignoring malformed {}: {}", CURRENT_SCENE_CHANGED, e),
            }
        })
    }

    /// Close our direction; pending calls fail once the server hangs up.
    pub async fn close(&self) {
        self.shared.sender.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed_reason().is_some()
    }

    /// Why the session ended, once it has.
    pub fn close_reason(&self) -> Option<RpcError> {
        self.shared.closed_reason()
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.receive_task.abort();
    }
}
