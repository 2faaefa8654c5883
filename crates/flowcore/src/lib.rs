//! Core abstractions for the actor flow engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: tokens and values, the actor and condition
//! contracts, variables, storage, flow descriptions and execution hooks.
//! It contains no execution logic.

pub mod condition;
mod error;
pub mod events;
mod flow;
mod options;
mod restart;
pub mod storage;
mod token;
mod value;
pub mod variables;
mod actor;

pub use actor::{Actor, ActorContext, ActorKind, ExecutionOutcome};
pub use condition::{Condition, ConditionContext};
pub use error::{ActorFailure, ExecutionError, FlowError, SetupError};
pub use events::*;
pub use flow::{ActorSpec, ConditionSpec, ErrorHandling, FlowId, FlowSettings, FlowSpec};
pub use options::Options;
pub use restart::{NoRestart, RestartDecision, RestartLimited, RestartPolicy};
pub use storage::{GlobalStorage, StorageName, StorageScope, StorageTable};
pub use token::Token;
pub use value::Value;
pub use variables::{ScopeId, VariableScopes};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
