// crates/flowcore/src/events/mod.rs

mod base;
mod listener;

pub use base::{EventBus, EventBusListener, ExecutionEvent};
pub use listener::{
    ActorInfo, ExecutionId, ExecutionListener, FlowInfo, FlowOutcome, NullListener,
};
