use crate::registry::ActorRegistry;
use crate::tree::ActorTree;
use flowcore::{
    ActorFailure, ExecutionError, ExecutionListener, FlowError, FlowInfo, FlowOutcome, FlowSpec,
    GlobalStorage, NoRestart, NullListener, RestartDecision, RestartPolicy, SetupError,
    StorageTable, Token, VariableScopes,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// Requests a cooperative stop of a running flow.
///
/// The engine checks the flag before every actor invocation; actors that
/// sleep through [`ActorContext::sleep`](flowcore::ActorContext::sleep)
/// wake up immediately.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Result of a run that did not fail
#[derive(Debug, Clone)]
pub struct FlowRun {
    pub outcome: FlowOutcome,
    /// Tokens leaving the root scope's last actor
    pub outputs: Vec<Token>,
}

/// One instantiated flow: actor tree, variables, storage and hooks.
///
/// An instance is meant to run once; restarts build a fresh instance.
pub struct FlowInstance {
    pub(crate) info: FlowInfo,
    pub(crate) tree: ActorTree,
    pub(crate) variables: VariableScopes,
    pub(crate) storage: StorageTable,
    pub(crate) listener: Arc<dyn ExecutionListener>,
    pub(crate) restart_policy: Arc<dyn RestartPolicy>,
    pub(crate) cancellation: CancellationToken,
}

impl FlowInstance {
    /// Builds the actor tree of `spec`; the root scope starts with the flow's variables
    pub fn new(spec: &FlowSpec, registry: &ActorRegistry) -> Result<Self, SetupError> {
        let mut variables = VariableScopes::new();
        let root = variables.root();
        for (name, value) in &spec.variables {
            variables.set(root, name.as_str(), value.as_str());
        }

        let tree = ActorTree::build(spec, registry, &mut variables)?;

        Ok(Self {
            info: FlowInfo {
                flow_id: spec.id,
                execution_id: Uuid::new_v4(),
                name: tree.node(tree.root()).name().to_string(),
                attempt: 0,
            },
            tree,
            variables,
            storage: StorageTable::new(),
            listener: Arc::new(NullListener),
            restart_policy: Arc::new(NoRestart),
            cancellation: CancellationToken::new(),
        })
    }

    pub fn with_global_storage(mut self, global: GlobalStorage) -> Self {
        self.storage = StorageTable::with_global(global);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_restart_policy(mut self, policy: Arc<dyn RestartPolicy>) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn with_stop_handle(mut self, handle: &StopHandle) -> Self {
        self.cancellation = handle.token();
        self
    }

    pub(crate) fn with_attempt(mut self, attempt: u32) -> Self {
        self.info.attempt = attempt;
        self
    }

    /// Binds a variable in the root scope, overriding the flow's own value
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let root = self.variables.root();
        self.variables.set(root, name, value);
    }

    pub fn info(&self) -> &FlowInfo {
        &self.info
    }

    pub fn tree(&self) -> &ActorTree {
        &self.tree
    }

    pub fn variables(&self) -> &VariableScopes {
        &self.variables
    }

    pub fn storage(&self) -> &StorageTable {
        &self.storage
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.cancellation.clone(),
        }
    }

    /// Asks the restart policy what to do about a fatal error of this instance
    pub fn restart_decision(&self, failure: &ActorFailure) -> RestartDecision {
        self.restart_policy.on_fatal_error(&self.info, failure)
    }

    /// Sets up and wraps up every actor without executing anything
    pub async fn validate(&mut self) -> Result<(), SetupError> {
        let result = self.set_up_actors().await;
        self.wrap_up_actors().await;
        result
    }

    /// Sets up, executes and wraps up the flow.
    ///
    /// A set up failure wraps up the actors initialized so far and never
    /// starts the flow. A stop request ends the run with
    /// [`FlowOutcome::Stopped`]; any other failure is returned as an error.
    pub async fn run(&mut self) -> Result<FlowRun, FlowError> {
        if let Err(e) = self.set_up_actors().await {
            error!("Set up of flow '{}' failed: {}", self.info.name, e);
            self.wrap_up_actors().await;
            return Err(e.into());
        }

        info!(
            execution_id = %self.info.execution_id,
            attempt = self.info.attempt,
            "Starting flow '{}'",
            self.info.name
        );
        self.listener.on_start(&self.info);

        let result = self.execute_root().await;
        self.wrap_up_actors().await;

        let (outcome, result) = match result {
            Ok(outputs) => (FlowOutcome::Finished, Ok(outputs)),
            Err(failure) if failure.error == ExecutionError::Cancelled => {
                (FlowOutcome::Stopped, Ok(Vec::new()))
            }
            Err(failure) => (FlowOutcome::Failed(failure.to_string()), Err(failure)),
        };
        self.listener.on_finish(&self.info, &outcome);

        match result {
            Ok(outputs) => {
                info!("Flow '{}' ended: {:?}", self.info.name, outcome);
                Ok(FlowRun { outcome, outputs })
            }
            Err(failure) => {
                error!("Flow '{}' failed: {}", self.info.name, failure);
                Err(FlowError::Execution(failure))
            }
        }
    }
}
