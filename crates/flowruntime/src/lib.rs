//! Flow execution runtime
//!
//! This crate turns flow descriptions into actor trees and runs them:
//! the control-flow actors, callable actor resolution, the recursive
//! executor, the registry of leaf actor types and the restarting runner.

mod callable;
pub mod control;
mod executor;
mod instance;
mod loader;
mod registry;
mod runtime;
mod tree;

pub use callable::CallableActorRegistry;
pub use control::{CallableRole, ControlActor, LocalScope, ScopeHandling};
pub use instance::{FlowInstance, FlowRun, StopHandle};
pub use loader::{load_flow, parse_flow, render_flow, save_flow, FlowFormat};
pub use registry::{ActorFactory, ActorMetadata, ActorRegistry, ConditionFactory, OptionDefinition};
pub use runtime::{ExecuteOptions, FlowReport, FlowRuntime, RuntimeConfig};
pub use tree::{ActorNode, ActorTree, Behavior, InputMode, NodeId, Shape};
