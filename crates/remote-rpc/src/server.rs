//! Responder-side dispatcher

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use net_transport::{SecureChannel, SecureSender};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::Value;
use shared_protocol::{
    HELLO, INTERNAL_ERROR, IdParams, OUTPUTS_GET, OUTPUTS_SET_DELAY, OUTPUTS_START, OUTPUTS_STOP,
    RpcErrorObject, RpcMessage, SCENES_ACTIVATE, SCENES_GET, SetDelayParams,
};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{RpcError, RpcResult, SoftwareError, StreamingSoftware};

type HandlerResult = Result<Value, RpcErrorObject>;
type Handler =
    Box<dyn Fn(Arc<dyn StreamingSoftware>, Value) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

fn to_result<T: Serialize>(value: T) -> HandlerResult {
    serde_json::to_value(value).map_err(|e| RpcErrorObject::new(INTERNAL_ERROR, e.to_string()))
}

fn failure(e: SoftwareError) -> RpcErrorObject {
    RpcErrorObject::software_failure(e.to_string())
}

/// Method name → handler, built once per server.
pub struct MethodRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler whose params deserialize into `P`.
    ///
    /// Params that fail to deserialize are answered with `-32602`.
    pub fn register<P, F, Fut>(&mut self, method: &'static str, handler: F)
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(Arc<dyn StreamingSoftware>, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let boxed: Handler = Box::new(move |software: Arc<dyn StreamingSoftware>, params: Value| {
            match serde_json::from_value::<P>(params) {
                Ok(params) => handler(software, params).boxed(),
                Err(e) => futures::future::ready(Err(RpcErrorObject::invalid_params(e))).boxed(),
            }
        });
        self.handlers.insert(method, boxed);
    }

    /// The six methods every streaming software answers.
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register(OUTPUTS_GET, |software, _: IgnoredAny| async move {
            to_result(software.outputs().await)
        });
        registry.register(SCENES_GET, |software, _: IgnoredAny| async move {
            to_result(software.scenes().await)
        });
        registry.register(OUTPUTS_START, |software, params: IdParams| async move {
            software.start_output(&params.id).await.map(|()| Value::Null).map_err(failure)
        });
        registry.register(OUTPUTS_STOP, |software, params: IdParams| async move {
            software.stop_output(&params.id).await.map(|()| Value::Null).map_err(failure)
        });
        registry.register(OUTPUTS_SET_DELAY, |software, params: SetDelayParams| async move {
            software
                .set_output_delay(&params.id, params.seconds)
                .await
                .map(|()| Value::Null)
                .map_err(|e| {
                    debug!("setDelay on {} failed: {}", params.id, e);
                    RpcErrorObject::software_failure("The software failed to set the delay")
                })
        });
        registry.register(SCENES_ACTIVATE, |software, params: IdParams| async move {
            software.activate_scene(&params.id).await.map(|()| Value::Null).map_err(failure)
        });

        registry
    }

    /// Start handling a call, or `None` if the method is unknown.
    pub fn dispatch(
        &self,
        software: Arc<dyn StreamingSoftware>,
        method: &str,
        params: Value,
    ) -> Option<BoxFuture<'static, HandlerResult>> {
        self.handlers
            .get(method)
            .map(|handler| handler(software, params))
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Answers calls from one controller at a time per `serve` invocation.
#[derive(Clone)]
pub struct RpcServer {
    software: Arc<dyn StreamingSoftware>,
    registry: Arc<MethodRegistry>,
}

impl RpcServer {
    pub fn new(software: Arc<dyn StreamingSoftware>) -> Self {
        Self::with_registry(software, MethodRegistry::standard())
    }

    pub fn with_registry(software: Arc<dyn StreamingSoftware>, registry: MethodRegistry) -> Self {
        Self {
            software,
            registry: Arc::new(registry),
        }
    }

    /// Serve one established session until it ends.
    ///
    /// Sends `hello`, then answers every request on its own task and pushes
    /// software events as notifications. Returns `Ok` when the peer closes
    /// cleanly; in-flight handlers are aborted either way.
    pub async fn serve(&self, channel: SecureChannel) -> RpcResult<()> {
        let (sender, mut receiver) = channel.split();
        let mut events = self.software.subscribe();
        let mut events_open = true;
        let mut handlers = JoinSet::new();

        sender
            .send(&RpcMessage::notification(HELLO, None).to_vec())
            .await?;
        info!("Session ready, sent hello");

        let result = loop {
            tokio::select! {
                frame = receiver.recv() => match frame {
                    Ok(Some(frame)) => self.handle_frame(&frame, &sender, &mut handlers),
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(RpcError::from(e)),
                },

                event = events.recv(), if events_open => match event {
                    Ok(event) => {
                        if let Err(e) = sender.send(&event.to_notification().to_vec()).await {
                            break Err(e.into());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Controller missed {} software events", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },

                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Request handler failed: {}", e);
                    }
                }
            }
        };

        handlers.abort_all();
        sender.close().await;
        info!("Session ended");
        result
    }

    fn handle_frame(&self, frame: &[u8], sender: &SecureSender, handlers: &mut JoinSet<()>) {
        let message = match RpcMessage::from_slice(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring malformed message: {}", e);
                return;
            }
        };

        let RpcMessage::Request { id, method, params } = message else {
            debug!("Ignoring non-request message");
            return;
        };

        debug!(%id, %method, "Received call");
        let call = self.registry.dispatch(self.software.clone(), &method, params);
        let sender = sender.clone();

        handlers.spawn(async move {
            let reply = match call {
                Some(call) => match call.await {
                    Ok(result) => RpcMessage::success(id, result),
                    Err(error) => RpcMessage::error(id, error),
                },
                None => {
                    debug!("Unknown method {}", method);
                    RpcMessage::error(id, RpcErrorObject::method_not_found(&method))
                }
            };

            if let Err(e) = sender.send(&reply.to_vec()).await {
                debug!("Could not send response: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DummySoftware;
    use serde_json::json;
    use shared_protocol::{INVALID_PARAMS, METHOD_NOT_FOUND};

    fn software() -> Arc<dyn StreamingSoftware> {
        Arc::new(DummySoftware::demo())
    }

    #[tokio::test]
    async fn test_registry_dispatches_known_methods() {
        let registry = MethodRegistry::standard();
        for method in [
            OUTPUTS_GET,
            SCENES_GET,
            OUTPUTS_START,
            OUTPUTS_STOP,
            OUTPUTS_SET_DELAY,
            SCENES_ACTIVATE,
        ] {
            assert!(
                registry.dispatch(software(), method, json!({"id": "cam1"})).is_some(),
                "{method} not registered"
            );
        }
        assert!(registry.dispatch(software(), "outputs/explode", Value::Null).is_none());

        let result = registry
            .dispatch(software(), OUTPUTS_GET, Value::Null)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(result["cam1"]["type"], "local_stream");
    }

    #[tokio::test]
    async fn test_invalid_params_rejected() {
        let registry = MethodRegistry::standard();
        let error = registry
            .dispatch(software(), OUTPUTS_START, json!({"name": "cam1"}))
            .unwrap()
            .await
            .unwrap_err();
        assert_eq!(error.code, INVALID_PARAMS);
        assert_ne!(error.code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_set_delay_failure_message() {
        let registry = MethodRegistry::standard();
        let error = registry
            .dispatch(software(), OUTPUTS_SET_DELAY, json!({"id": "cam1", "seconds": 5}))
            .unwrap()
            .await
            .unwrap_err();
        assert_eq!(error.code, 0);
        assert_eq!(error.message, "The software failed to set the delay");
    }

    #[tokio::test]
    async fn test_mutating_methods_return_null() {
        let registry = MethodRegistry::standard();
        let result = registry
            .dispatch(software(), SCENES_ACTIVATE, json!({"id": "brb"}))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
    }
}
