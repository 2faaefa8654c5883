use crate::instance::{FlowInstance, StopHandle};
use crate::registry::ActorRegistry;
use flowcore::{
    EventBus, ExecutionEvent, ExecutionId, ExecutionListener, FlowError, FlowId, FlowOutcome,
    FlowSpec, GlobalStorage, RestartDecision, RestartPolicy, SetupError, Token,
};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Main runtime for executing flows
pub struct FlowRuntime {
    registry: Arc<ActorRegistry>,
    event_bus: Arc<EventBus>,
    global_storage: GlobalStorage,
    config: RuntimeConfig,
}

impl FlowRuntime {
    /// Create a new runtime with an empty registry
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(ActorRegistry::new()), config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<ActorRegistry>, config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            event_bus,
            global_storage: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Get access to the actor registry
    pub fn registry(&self) -> &Arc<ActorRegistry> {
        &self.registry
    }

    /// Storage shared by every flow this runtime executes
    pub fn global_storage(&self) -> &GlobalStorage {
        &self.global_storage
    }

    /// Builds a flow instance wired to this runtime's global storage
    pub fn instantiate(
        &self,
        spec: &FlowSpec,
        options: &ExecuteOptions,
    ) -> Result<FlowInstance, SetupError> {
        let mut instance = FlowInstance::new(spec, &self.registry)?
            .with_global_storage(self.global_storage.clone())
            .with_stop_handle(&options.stop);

        if let Some(listener) = &options.listener {
            instance = instance.with_listener(listener.clone());
        }
        for (name, value) in &options.variables {
            instance.set_variable(name.as_str(), value.as_str());
        }
        Ok(instance)
    }

    /// Builds the flow and sets up and wraps up every actor, without executing
    pub async fn validate(&self, spec: &FlowSpec) -> Result<(), FlowError> {
        let mut instance = self.instantiate(spec, &ExecuteOptions::default())?;
        instance.validate().await?;
        Ok(())
    }

    /// Execute a flow with default options
    pub async fn execute(&self, spec: &FlowSpec) -> Result<FlowReport, FlowError> {
        self.execute_with(spec, ExecuteOptions::default()).await
    }

    /// Execute a flow, restarting it on fatal errors as long as the restart
    /// policy asks for it
    pub async fn execute_with(
        &self,
        spec: &FlowSpec,
        options: ExecuteOptions,
    ) -> Result<FlowReport, FlowError> {
        let policy: Arc<dyn RestartPolicy> = match &options.restart_policy {
            Some(policy) => policy.clone(),
            None => Arc::from(spec.settings.on_error.restart_policy()),
        };

        let mut attempt = 0;
        loop {
            let mut instance = self
                .instantiate(spec, &options)?
                .with_restart_policy(policy.clone())
                .with_attempt(attempt);
            let execution_id = instance.info().execution_id;

            match instance.run().await {
                Ok(run) => {
                    return Ok(FlowReport {
                        flow_id: spec.id,
                        execution_id,
                        outcome: run.outcome,
                        restarts: attempt,
                        outputs: run.outputs,
                    });
                }
                Err(FlowError::Execution(failure)) => {
                    let decision = instance.restart_decision(&failure);
                    if decision == RestartDecision::Restart && attempt < self.config.restart_limit {
                        attempt += 1;
                        info!("Restarting flow '{}' (attempt {})", spec.name, attempt);
                        continue;
                    }
                    if decision == RestartDecision::Restart {
                        warn!(
                            "Flow '{}' reached the restart limit of {}",
                            spec.name, self.config.restart_limit
                        );
                    }
                    return Err(FlowError::Execution(failure));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-execution settings
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    pub listener: Option<Arc<dyn ExecutionListener>>,
    /// Overrides the policy derived from the flow's settings
    pub restart_policy: Option<Arc<dyn RestartPolicy>>,
    pub stop: StopHandle,
    /// Root variables overriding the flow's own
    pub variables: BTreeMap<String, String>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_restart_policy(mut self, policy: Arc<dyn RestartPolicy>) -> Self {
        self.restart_policy = Some(policy);
        self
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

/// Summary of a flow execution that did not fail
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub flow_id: FlowId,
    /// Execution id of the last attempt
    pub execution_id: ExecutionId,
    pub outcome: FlowOutcome,
    pub restarts: u32,
    pub outputs: Vec<Token>,
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    /// Hard cap on restarts of one execution, whatever the restart policy says
    pub restart_limit: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            restart_limit: 100,
        }
    }
}
