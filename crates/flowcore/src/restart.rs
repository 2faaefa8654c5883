use crate::events::FlowInfo;
use crate::{ActorFailure, ErrorHandling};

/// Answer of a [`RestartPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Stop,
    Restart,
}

/// Consulted only when a flow run ends with a fatal error
pub trait RestartPolicy: Send + Sync {
    fn on_fatal_error(&self, flow: &FlowInfo, error: &ActorFailure) -> RestartDecision;
}

/// Never restarts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRestart;

impl RestartPolicy for NoRestart {
    fn on_fatal_error(&self, _flow: &FlowInfo, _error: &ActorFailure) -> RestartDecision {
        RestartDecision::Stop
    }
}

/// Restarts until `max_restarts` restarts have happened
#[derive(Debug, Clone, Copy)]
pub struct RestartLimited {
    pub max_restarts: u32,
}

impl RestartPolicy for RestartLimited {
    fn on_fatal_error(&self, flow: &FlowInfo, error: &ActorFailure) -> RestartDecision {
        if flow.attempt < self.max_restarts {
            tracing::warn!(
                "Restarting flow '{}' after fatal error ({} of {}): {}",
                flow.name,
                flow.attempt + 1,
                self.max_restarts,
                error
            );
            RestartDecision::Restart
        } else {
            RestartDecision::Stop
        }
    }
}

impl ErrorHandling {
    /// Policy matching this setting
    pub fn restart_policy(&self) -> Box<dyn RestartPolicy> {
        match self {
            ErrorHandling::StopFlow => Box::new(NoRestart),
            ErrorHandling::RestartFlow { max_restarts } => Box::new(RestartLimited {
                max_restarts: *max_restarts,
            }),
        }
    }
}
