use crate::{ActorKind, ExecutionError, FlowId, Token};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Identity of one run of a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowInfo {
    pub flow_id: FlowId,
    pub execution_id: ExecutionId,
    pub name: String,
    /// 0 for the first attempt, incremented on every restart
    pub attempt: u32,
}

/// Identity of an actor inside a running flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorInfo {
    pub execution_id: ExecutionId,
    /// Slash-separated path from the root
    pub name: String,
    pub actor_type: String,
    pub kind: ActorKind,
}

/// How a flow run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum FlowOutcome {
    Finished,
    Stopped,
    Failed(String),
}

impl FlowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FlowOutcome::Finished)
    }
}

/// Hooks invoked synchronously on the engine's execution task
pub trait ExecutionListener: Send + Sync {
    fn on_start(&self, _flow: &FlowInfo) {}

    /// Called for every token an actor outputs
    fn on_token(&self, _actor: &ActorInfo, _token: &Token) {}

    /// Called once per error, at the actor that raised it
    fn on_error(&self, _actor: &ActorInfo, _error: &ExecutionError) {}

    fn on_finish(&self, _flow: &FlowInfo, _outcome: &FlowOutcome) {}
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl ExecutionListener for NullListener {}
