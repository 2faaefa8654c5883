//! Standard actor library
//!
//! Collection of built-in leaf actors and conditions for common operations

mod command;
pub mod conditions;
mod debug;
mod file;
mod loops;
mod storage;
mod time;
mod transform;
mod variables;

pub use command::CommandActor;
pub use debug::{LogSink, NullSink};
pub use file::DumpFile;
pub use loops::{ForLoop, Start, StringConstants};
pub use storage::{CombineArrays, SetStorageValue, StorageValue, ZipArrays};
pub use time::{Delay, TimedSource};
pub use transform::{ArrayToSequence, Format, PassThrough};
pub use variables::{SetVariable, VariableSource, VariableTarget};

use flowruntime::ActorRegistry;
use std::sync::Arc;

/// Register all standard actors and conditions with a registry
pub fn register_all(registry: &mut ActorRegistry) {
    registry.register(Arc::new(variables::SetVariableFactory::standalone()));
    registry.register(Arc::new(variables::SetVariableFactory::transformer()));
    registry.register(Arc::new(variables::VariableSourceFactory));

    registry.register(Arc::new(loops::StartFactory));
    registry.register(Arc::new(loops::ForLoopFactory));
    registry.register(Arc::new(loops::StringConstantsFactory));

    registry.register(Arc::new(storage::StorageValueFactory));
    registry.register(Arc::new(storage::SetStorageValueFactory));
    registry.register(Arc::new(storage::CombineArraysFactory));
    registry.register(Arc::new(storage::ZipArraysFactory));

    registry.register(Arc::new(time::TimedSourceFactory));
    registry.register(Arc::new(time::DelayFactory));

    registry.register(Arc::new(transform::PassThroughFactory));
    registry.register(Arc::new(transform::ArrayToSequenceFactory));
    registry.register(Arc::new(transform::FormatFactory));
    registry.register(Arc::new(command::CommandFactory));

    registry.register(Arc::new(debug::NullSinkFactory));
    registry.register(Arc::new(debug::LogSinkFactory));
    registry.register(Arc::new(file::DumpFileFactory));

    conditions::register_all(registry);
}

/// Registry preloaded with every standard actor and condition
pub fn standard_registry() -> ActorRegistry {
    let mut registry = ActorRegistry::new();
    register_all(&mut registry);
    registry
}
