//! RPC method and notification names, and their parameter payloads

use serde::{Deserialize, Serialize};

use crate::OutputState;

/// List outputs: `null → {id: Output}`
pub const OUTPUTS_GET: &str = "outputs/get";
/// Start an output: `{id} → null`
pub const OUTPUTS_START: &str = "outputs/start";
/// Stop an output: `{id} → null`
pub const OUTPUTS_STOP: &str = "outputs/stop";
/// Set an output's delay: `{id, seconds} → null`
pub const OUTPUTS_SET_DELAY: &str = "outputs/setDelay";
/// List scenes: `null → {id: Scene}`
pub const SCENES_GET: &str = "scenes/get";
/// Switch to a scene: `{id} → null`
pub const SCENES_ACTIVATE: &str = "scenes/activate";

/// Session is ready (no params)
pub const HELLO: &str = "hello";
/// `{id, state}`
pub const OUTPUT_STATE_CHANGED: &str = "outputs/stateChanged";
/// `{id}`
pub const CURRENT_SCENE_CHANGED: &str = "scenes/currentSceneChanged";

/// Params for methods addressing a single output or scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdParams {
    pub id: String,
}

/// Params for `outputs/setDelay`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDelayParams {
    pub id: String,
    pub seconds: i64,
}

/// Payload of `outputs/stateChanged`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputStateChanged {
    pub id: String,
    pub state: OutputState,
}

/// Payload of `scenes/currentSceneChanged`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentSceneChanged {
    pub id: String,
}
