use crate::storage::{StorageName, StorageTable};
use crate::variables::{ScopeId, VariableScopes};
use crate::{ExecutionError, Options, SetupError, Token, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Role an actor plays in a scope's pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// Runs once when its scope starts; no input, no output
    Standalone,
    /// Produces tokens without input
    Source,
    /// Consumes one token, produces zero or more
    Transformer,
    /// Consumes tokens, produces none
    Sink,
    /// Alters how child actors get invoked
    Control,
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActorKind::Standalone => "standalone",
            ActorKind::Source => "source",
            ActorKind::Transformer => "transformer",
            ActorKind::Sink => "sink",
            ActorKind::Control => "control",
        };
        f.write_str(name)
    }
}

/// Result of a single `execute` call
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    NoOutput,
    SingleOutput(Token),
    MultiOutput(Vec<Token>),
}

impl ExecutionOutcome {
    pub fn is_empty(&self) -> bool {
        match self {
            ExecutionOutcome::NoOutput => true,
            ExecutionOutcome::SingleOutput(_) => false,
            ExecutionOutcome::MultiOutput(tokens) => tokens.is_empty(),
        }
    }

    pub fn into_tokens(self) -> Vec<Token> {
        match self {
            ExecutionOutcome::NoOutput => Vec::new(),
            ExecutionOutcome::SingleOutput(token) => vec![token],
            ExecutionOutcome::MultiOutput(tokens) => tokens,
        }
    }
}

impl From<Token> for ExecutionOutcome {
    fn from(token: Token) -> Self {
        ExecutionOutcome::SingleOutput(token)
    }
}

/// Core trait that all leaf actors implement.
///
/// Sources are called with `None` until they return
/// [`ExecutionOutcome::NoOutput`]; transformers and sinks always receive a
/// token. Control-flow actors are not implemented through this trait, the
/// runtime owns them.
#[async_trait]
pub trait Actor: Send {
    /// Unique type identifier (e.g., "source.for_loop", "sink.log")
    fn actor_type(&self) -> &str;

    fn kind(&self) -> ActorKind;

    /// Optional: acquire resources once before the first execution.
    /// The context carries the raw, unexpanded options.
    async fn set_up(&mut self, _ctx: &mut ActorContext<'_>) -> Result<(), SetupError> {
        Ok(())
    }

    /// Execute the actor; the context carries options with variables expanded
    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError>;

    /// Optional: return to the initial state when the enclosing scope restarts
    fn reset(&mut self) {}

    /// Optional: release resources; called exactly once after a successful set up
    async fn wrap_up(&mut self) {}
}

/// Execution context passed to an actor on every call
pub struct ActorContext<'a> {
    name: &'a str,
    options: Options,
    scope: ScopeId,
    variables: &'a mut VariableScopes,
    storage: &'a mut StorageTable,
    cancellation: CancellationToken,
}

impl<'a> ActorContext<'a> {
    pub fn new(
        name: &'a str,
        options: Options,
        scope: ScopeId,
        variables: &'a mut VariableScopes,
        storage: &'a mut StorageTable,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            name,
            options,
            scope,
            variables,
            storage,
            cancellation,
        }
    }

    /// Full name of the executing actor
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Get required option as string or return error
    pub fn require_str(&self, name: &str) -> Result<&str, ExecutionError> {
        Ok(self.options.require_str(name)?)
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(self.scope, name)
    }

    pub fn require_variable(&self, name: &str) -> Result<&str, ExecutionError> {
        self.variable(name)
            .ok_or_else(|| ExecutionError::MissingVariable {
                name: name.to_string(),
            })
    }

    /// Binds a variable in the innermost enclosing scope
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.set(self.scope, name, value);
    }

    /// Binds a variable in the flow's root scope
    pub fn set_root_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let root = self.variables.root();
        self.variables.set(root, name, value);
    }

    /// Expands `@{name}` placeholders against the actor's scope chain
    pub fn expand(&self, template: &str) -> Result<String, ExecutionError> {
        self.variables.expand(self.scope, template)
    }

    pub fn storage(&self) -> &StorageTable {
        &*self.storage
    }

    pub fn storage_mut(&mut self) -> &mut StorageTable {
        &mut *self.storage
    }

    /// Resolves the storage name held in `option`
    pub fn storage_name(&self, option: &str) -> Result<StorageName, ExecutionError> {
        StorageName::parse(self.require_str(option)?)
    }

    pub fn get_storage(&self, name: &StorageName) -> Result<Value, ExecutionError> {
        self.storage.get(name)
    }

    pub fn put_storage(&mut self, name: &StorageName, value: Value) {
        self.storage.put(name, value);
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Sleeps for `duration` unless the flow gets stopped first
    pub async fn sleep(&self, duration: Duration) -> Result<(), ExecutionError> {
        tokio::select! {
            _ = self.cancellation.cancelled() => Err(ExecutionError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

impl From<SetupError> for ExecutionError {
    fn from(e: SetupError) -> Self {
        ExecutionError::Failed(e.to_string())
    }
}
