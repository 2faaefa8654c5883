use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("Execution error: {0}")]
    Execution(#[from] ActorFailure),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported flow format: {0}")]
    UnsupportedFormat(String),
}

/// Configuration problems detected before a flow starts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SetupError {
    #[error("Missing required option: {0}")]
    MissingOption(String),

    #[error("Invalid value for option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("Unknown actor type: {0}")]
    UnknownActorType(String),

    #[error("Unknown condition type: {0}")]
    UnknownConditionType(String),

    #[error("Duplicate actor name '{name}' below '{parent}'")]
    DuplicateName { parent: String, name: String },

    #[error("Invalid structure at '{actor}': {reason}")]
    InvalidStructure { actor: String, reason: String },

    #[error("Callable actor '{name}' referenced by '{actor}' not found")]
    UnresolvedCallable { actor: String, name: String },

    #[error("Callable actor '{0}' references itself")]
    RecursiveCallable(String),

    #[error("Set up of '{actor}' failed: {reason}")]
    ActorSetUp { actor: String, reason: String },
}

impl SetupError {
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        SetupError::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}

/// Failure raised while an actor executes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Storage item not found: {name}")]
    MissingStorage { name: String },

    #[error("Array '{name}' has length {actual}, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Variable not defined: {name}")]
    MissingVariable { name: String },

    #[error("Invalid input type: expected {expected}, got {actual}")]
    InvalidInputType { expected: String, actual: String },

    #[error("Execution failed: {0}")]
    Failed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Contract violation: {0}")]
    Contract(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl ExecutionError {
    /// Errors that no error-tolerant actor may swallow
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutionError::Cancelled | ExecutionError::Contract(_))
    }

    pub fn invalid_input(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        ExecutionError::InvalidInputType {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(e: std::io::Error) -> Self {
        ExecutionError::Io(e.to_string())
    }
}

/// An execution error attributed to the actor that raised it
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{actor}: {error}")]
pub struct ActorFailure {
    pub actor: String,
    #[source]
    pub error: ExecutionError,
}

impl ActorFailure {
    pub fn new(actor: impl Into<String>, error: ExecutionError) -> Self {
        Self {
            actor: actor.into(),
            error,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.error.is_fatal()
    }
}
