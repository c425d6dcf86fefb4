//! The streaming software being remote-controlled

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use shared_protocol::{
    CURRENT_SCENE_CHANGED, CurrentSceneChanged, OUTPUT_STATE_CHANGED, Output, OutputState,
    OutputStateChanged, OutputType, RpcMessage, Scene,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

/// Capacity of the event broadcast channel
pub const EVENT_CAPACITY: usize = 256;

/// Something changed inside the software
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftwareEvent {
    OutputStateChanged { id: String, state: OutputState },
    CurrentSceneChanged { id: String },
}

impl SoftwareEvent {
    /// The notification pushed to connected controllers
    pub fn to_notification(&self) -> RpcMessage {
        let (method, params) = match self {
            Self::OutputStateChanged { id, state } => (
                OUTPUT_STATE_CHANGED,
                serde_json::to_value(OutputStateChanged {
                    id: id.clone(),
                    state: *state,
                }),
            ),
            Self::CurrentSceneChanged { id } => (
                CURRENT_SCENE_CHANGED,
                serde_json::to_value(CurrentSceneChanged { id: id.clone() }),
            ),
        };
        RpcMessage::notification(method, Some(params.unwrap_or(Value::Null)))
    }
}

#[derive(Debug, Clone, Error)]
pub enum SoftwareError {
    #[error("Unknown output: {0}")]
    UnknownOutput(String),

    #[error("Unknown scene: {0}")]
    UnknownScene(String),

    #[error("Not supported: {0}")]
    Unsupported(&'static str),

    #[error("{0}")]
    Failed(String),
}

/// Operations a controller may drive remotely.
#[async_trait]
pub trait StreamingSoftware: Send + Sync {
    async fn outputs(&self) -> HashMap<String, Output>;

    async fn scenes(&self) -> HashMap<String, Scene>;

    async fn start_output(&self, id: &str) -> Result<(), SoftwareError>;

    async fn stop_output(&self, id: &str) -> Result<(), SoftwareError>;

    async fn set_output_delay(&self, _id: &str, _seconds: i64) -> Result<(), SoftwareError> {
        Err(SoftwareError::Unsupported("output delay"))
    }

    async fn activate_scene(&self, id: &str) -> Result<(), SoftwareError>;

    /// Events from now on; each connection takes its own receiver.
    fn subscribe(&self) -> broadcast::Receiver<SoftwareEvent>;
}

struct DummyState {
    outputs: HashMap<String, Output>,
    scenes: HashMap<String, Scene>,
}

/// In-memory software for demos and tests.
pub struct DummySoftware {
    state: RwLock<DummyState>,
    events: broadcast::Sender<SoftwareEvent>,
}

impl DummySoftware {
    pub fn new(outputs: Vec<Output>, scenes: Vec<Scene>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(DummyState {
                outputs: outputs.into_iter().map(|o| (o.id.clone(), o)).collect(),
                scenes: scenes.into_iter().map(|s| (s.id.clone(), s)).collect(),
            }),
            events,
        }
    }

    /// A recording, a local stream and a delayed remote stream, plus two scenes.
    pub fn demo() -> Self {
        let output = |id: &str, name: &str, output_type, delay_seconds| Output {
            id: id.into(),
            name: name.into(),
            output_type,
            state: OutputState::Stopped,
            delay_seconds,
        };
        let scene = |id: &str, name: &str, active| Scene {
            id: id.into(),
            name: name.into(),
            active,
        };

        Self::new(
            vec![
                output("recording", "Recording", OutputType::LocalRecording, None),
                output("cam1", "Camera", OutputType::LocalStream, None),
                output("twitch", "Twitch", OutputType::RemoteStream, Some(0)),
            ],
            vec![scene("main", "Main", true), scene("brb", "Be Right Back", false)],
        )
    }

    fn set_output_state(&self, id: &str, state: OutputState) -> Result<(), SoftwareError> {
        {
            let mut guard = self.state.write();
            let output = guard
                .outputs
                .get_mut(id)
                .ok_or_else(|| SoftwareError::UnknownOutput(id.to_string()))?;
            output.state = state;
        }

        // No receivers just means nobody is connected.
        let _ = self.events.send(SoftwareEvent::OutputStateChanged {
            id: id.to_string(),
            state,
        });
        Ok(())
    }

    fn require_output(&self, id: &str) -> Result<(), SoftwareError> {
        if self.state.read().outputs.contains_key(id) {
            Ok(())
        } else {
            Err(SoftwareError::UnknownOutput(id.to_string()))
        }
    }
}

#[async_trait]
impl StreamingSoftware for DummySoftware {
    async fn outputs(&self) -> HashMap<String, Output> {
        self.state.read().outputs.clone()
    }

    async fn scenes(&self) -> HashMap<String, Scene> {
        self.state.read().scenes.clone()
    }

    async fn start_output(&self, id: &str) -> Result<(), SoftwareError> {
        self.require_output(id)?;
        info!("Starting output {}", id);
        self.set_output_state(id, OutputState::Starting)?;
        self.set_output_state(id, OutputState::Active)
    }

    async fn stop_output(&self, id: &str) -> Result<(), SoftwareError> {
        self.require_output(id)?;
        info!("Stopping output {}", id);
        self.set_output_state(id, OutputState::Stopping)?;
        self.set_output_state(id, OutputState::Stopped)
    }

    async fn set_output_delay(&self, id: &str, seconds: i64) -> Result<(), SoftwareError> {
        if seconds < 0 {
            return Err(SoftwareError::Failed(format!("negative delay {seconds}")));
        }

        let mut guard = self.state.write();
        let output = guard
            .outputs
            .get_mut(id)
            .ok_or_else(|| SoftwareError::UnknownOutput(id.to_string()))?;
        match output.delay_seconds.as_mut() {
            Some(delay) => {
                *delay = seconds;
                Ok(())
            }
            None => Err(SoftwareError::Unsupported("delay on this output")),
        }
    }

    async fn activate_scene(&self, id: &str) -> Result<(), SoftwareError> {
        {
            let mut guard = self.state.write();
            if !guard.scenes.contains_key(id) {
                return Err(SoftwareError::UnknownScene(id.to_string()));
            }
            for scene in guard.scenes.values_mut() {
                scene.active = scene.id == id;
            }
        }

        info!("Activated scene {}", id);
        let _ = self.events.send(SoftwareEvent::CurrentSceneChanged { id: id.to_string() });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SoftwareEvent> {
        self.events.subscribe()
    }
}
