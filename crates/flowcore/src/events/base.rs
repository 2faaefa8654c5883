use super::listener::{ActorInfo, ExecutionId, ExecutionListener, FlowInfo, FlowOutcome};
use crate::{ActorKind, ExecutionError, FlowId, Token, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted during flow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    FlowStarted {
        execution_id: ExecutionId,
        flow_id: FlowId,
        name: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    ActorToken {
        execution_id: ExecutionId,
        actor: String,
        kind: ActorKind,
        payload: Value,
        timestamp: DateTime<Utc>,
    },
    ActorFailed {
        execution_id: ExecutionId,
        actor: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    FlowFinished {
        execution_id: ExecutionId,
        outcome: FlowOutcome,
        timestamp: DateTime<Utc>,
    },
}

/// Global event bus
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        // no subscribers is not an error
        let _ = self.sender.send(event);
    }

    /// Listener that forwards engine callbacks onto this bus
    pub fn listener(&self) -> EventBusListener {
        EventBusListener {
            sender: self.sender.clone(),
        }
    }
}

/// Execution listener publishing [`ExecutionEvent`]s on a broadcast channel
#[derive(Clone)]
pub struct EventBusListener {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBusListener {
    fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }
}

impl ExecutionListener for EventBusListener {
    fn on_start(&self, flow: &FlowInfo) {
        self.emit(ExecutionEvent::FlowStarted {
            execution_id: flow.execution_id,
            flow_id: flow.flow_id,
            name: flow.name.clone(),
            attempt: flow.attempt,
            timestamp: Utc::now(),
        });
    }

    fn on_token(&self, actor: &ActorInfo, token: &Token) {
        self.emit(ExecutionEvent::ActorToken {
            execution_id: actor.execution_id,
            actor: actor.name.clone(),
            kind: actor.kind,
            payload: token.payload().clone(),
            timestamp: Utc::now(),
        });
    }

    fn on_error(&self, actor: &ActorInfo, error: &ExecutionError) {
        self.emit(ExecutionEvent::ActorFailed {
            execution_id: actor.execution_id,
            actor: actor.name.clone(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn on_finish(&self, flow: &FlowInfo, outcome: &FlowOutcome) {
        self.emit(ExecutionEvent::FlowFinished {
            execution_id: flow.execution_id,
            outcome: outcome.clone(),
            timestamp: Utc::now(),
        });
    }
}
