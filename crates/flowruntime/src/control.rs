//! Built-in control-flow actors.
//!
//! Control actors are a closed set owned by the runtime: they decide how
//! their children get invoked, so the executor dispatches on them directly
//! instead of going through the [`Actor`](flowcore::Actor) trait.

use crate::registry::{ActorMetadata, ActorRegistry, OptionDefinition};
use crate::tree::NodeId;
use flowcore::{ActorKind, ActorSpec, Condition, Options, SetupError};
use regex::Regex;

pub const SEQUENCE: &str = "control.sequence";
pub const TRIGGER: &str = "control.trigger";
pub const TEE: &str = "control.tee";
pub const IF_THEN_ELSE: &str = "control.if_then_else";
pub const SWITCH: &str = "control.switch";
pub const COUNT: &str = "control.count";
pub const LOCAL_SCOPE_TRIGGER: &str = "control.local_scope_trigger";
pub const TRY_CATCH: &str = "control.try_catch";
pub const CALLABLE_ACTORS: &str = "standalone.callable_actors";
pub const CALLABLE_SOURCE: &str = "source.callable";
pub const CALLABLE_TRANSFORMER: &str = "transformer.callable";
pub const CALLABLE_SINK: &str = "sink.callable";

pub const CONTROL_TYPES: &[&str] = &[
    SEQUENCE,
    TRIGGER,
    TEE,
    IF_THEN_ELSE,
    SWITCH,
    COUNT,
    LOCAL_SCOPE_TRIGGER,
    TRY_CATCH,
    CALLABLE_ACTORS,
    CALLABLE_SOURCE,
    CALLABLE_TRANSFORMER,
    CALLABLE_SINK,
];

pub fn is_control_type(actor_type: &str) -> bool {
    CONTROL_TYPES.contains(&actor_type)
}

/// Which side of the dataflow a callable reference stands in for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableRole {
    Source,
    Transformer,
    Sink,
}

/// How a local scope treats the surrounding variables or storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeHandling {
    /// Start from nothing
    Empty,
    /// Start from a filtered copy of the outer state
    Copy,
    /// Operate on the outer state directly
    Share,
}

impl ScopeHandling {
    fn parse(options: &Options, option: &str) -> Result<Self, SetupError> {
        match options.str_or(option, "empty") {
            "empty" => Ok(ScopeHandling::Empty),
            "copy" => Ok(ScopeHandling::Copy),
            "share" => Ok(ScopeHandling::Share),
            other => Err(SetupError::invalid_option(
                option,
                format!("expected empty, copy or share, got '{}'", other),
            )),
        }
    }
}

/// Settings of a `control.local_scope_trigger`
#[derive(Debug, Clone)]
pub struct LocalScope {
    pub variables: ScopeHandling,
    pub variables_filter: Regex,
    pub propagate_variables: Option<Regex>,
    pub storage: ScopeHandling,
    pub storage_filter: Regex,
    pub propagate_storage: Option<Regex>,
}

impl LocalScope {
    fn from_options(options: &Options) -> Result<Self, SetupError> {
        let variables = ScopeHandling::parse(options, "scope_handling_variables")?;
        let storage = ScopeHandling::parse(options, "scope_handling_storage")?;

        let propagate_variables = if options.bool_or("propagate_variables", false)? {
            Some(regex_option(options, "variables_regexp")?)
        } else {
            None
        };
        let propagate_storage = if options.bool_or("propagate_storage", false)? {
            Some(regex_option(options, "storage_regexp")?)
        } else {
            None
        };

        Ok(Self {
            variables,
            variables_filter: regex_option(options, "variables_filter")?,
            propagate_variables,
            storage,
            storage_filter: regex_option(options, "storage_filter")?,
            propagate_storage,
        })
    }
}

fn regex_option(options: &Options, option: &str) -> Result<Regex, SetupError> {
    let pattern = options.str_or(option, ".*");
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| SetupError::invalid_option(option, e.to_string()))
}

/// A control-flow actor
pub enum ControlActor {
    /// Runs its children as a pipeline; outputs whatever the last child outputs
    Sequence,
    /// Runs its scope for side effects, never forwards a token
    Trigger,
    /// Runs its scope on a copy of the input, then forwards the original
    Tee,
    IfThenElse {
        condition: Box<dyn Condition>,
    },
    /// One condition per case; an extra trailing child is the default case
    Switch {
        conditions: Vec<Box<dyn Condition>>,
    },
    /// Runs its scope when the condition holds, always forwards the input
    Count {
        condition: Box<dyn Condition>,
    },
    LocalScopeTrigger(LocalScope),
    TryCatch {
        error_variable: Option<String>,
    },
    /// Holds actors that are only reachable through callable references
    CallableActors,
    Callable {
        role: CallableRole,
        reference: String,
        target: Option<NodeId>,
    },
}

impl ControlActor {
    /// Builds the control actor for `spec`, or `None` if the type is not a control type
    pub fn from_spec(
        spec: &ActorSpec,
        registry: &ActorRegistry,
    ) -> Result<Option<Self>, SetupError> {
        let control = match spec.actor_type.as_str() {
            SEQUENCE => ControlActor::Sequence,
            TRIGGER => ControlActor::Trigger,
            TEE => ControlActor::Tee,
            IF_THEN_ELSE => ControlActor::IfThenElse {
                condition: single_condition(spec, registry)?,
            },
            SWITCH => ControlActor::Switch {
                conditions: spec
                    .conditions
                    .iter()
                    .map(|c| registry.create_condition(&c.condition_type, &c.options))
                    .collect::<Result<Vec<_>, _>>()?,
            },
            COUNT => ControlActor::Count {
                condition: single_condition(spec, registry)?,
            },
            LOCAL_SCOPE_TRIGGER => {
                ControlActor::LocalScopeTrigger(LocalScope::from_options(&spec.options)?)
            }
            TRY_CATCH => ControlActor::TryCatch {
                error_variable: spec
                    .options
                    .get("error_variable")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            },
            CALLABLE_ACTORS => ControlActor::CallableActors,
            CALLABLE_SOURCE => callable(spec, CallableRole::Source)?,
            CALLABLE_TRANSFORMER => callable(spec, CallableRole::Transformer)?,
            CALLABLE_SINK => callable(spec, CallableRole::Sink)?,
            _ => return Ok(None),
        };
        Ok(Some(control))
    }

    /// Whether the children form a pipeline with its own variable scope,
    /// rather than a set of branches
    pub fn opens_scope(&self) -> bool {
        matches!(
            self,
            ControlActor::Sequence
                | ControlActor::Trigger
                | ControlActor::Tee
                | ControlActor::Count { .. }
                | ControlActor::LocalScopeTrigger(_)
        )
    }

    /// Clears per-scope-run state: condition counters
    pub fn reset(&mut self) {
        match self {
            ControlActor::IfThenElse { condition } | ControlActor::Count { condition } => {
                condition.reset()
            }
            ControlActor::Switch { conditions } => {
                conditions.iter_mut().for_each(|c| c.reset());
            }
            _ => {}
        }
    }

    pub(crate) fn condition_mut(&mut self, index: usize) -> Option<&mut Box<dyn Condition>> {
        match self {
            ControlActor::IfThenElse { condition } | ControlActor::Count { condition } => {
                (index == 0).then_some(condition)
            }
            ControlActor::Switch { conditions } => conditions.get_mut(index),
            _ => None,
        }
    }
}

fn single_condition(
    spec: &ActorSpec,
    registry: &ActorRegistry,
) -> Result<Box<dyn Condition>, SetupError> {
    match spec.conditions.as_slice() {
        [condition] => registry.create_condition(&condition.condition_type, &condition.options),
        other => Err(SetupError::InvalidStructure {
            actor: spec.effective_name().to_string(),
            reason: format!("expected exactly one condition, found {}", other.len()),
        }),
    }
}

fn callable(spec: &ActorSpec, role: CallableRole) -> Result<ControlActor, SetupError> {
    let reference = spec.options.require_str("callable")?.trim().to_string();
    if reference.is_empty() {
        return Err(SetupError::invalid_option("callable", "name must not be empty"));
    }
    Ok(ControlActor::Callable {
        role,
        reference,
        target: None,
    })
}

/// Metadata of the built-in control types
pub fn metadata(actor_type: &str) -> Option<ActorMetadata> {
    let (kind, description, options) = match actor_type {
        SEQUENCE => (ActorKind::Control, "Runs children as a pipeline", vec![]),
        TRIGGER => (
            ActorKind::Control,
            "Runs its sub-flow for side effects and forwards nothing",
            vec![],
        ),
        TEE => (
            ActorKind::Control,
            "Runs its sub-flow on a copy of the token and forwards the original",
            vec![],
        ),
        IF_THEN_ELSE => (
            ActorKind::Control,
            "Routes the token to the then or else child",
            vec![],
        ),
        SWITCH => (
            ActorKind::Control,
            "Routes the token to the first case whose condition holds",
            vec![],
        ),
        COUNT => (
            ActorKind::Control,
            "Runs its sub-flow when the counting condition holds and forwards the token",
            vec![],
        ),
        LOCAL_SCOPE_TRIGGER => (
            ActorKind::Control,
            "Trigger with its own variables and storage",
            vec![
                OptionDefinition::optional("scope_handling_variables", "empty, copy or share"),
                OptionDefinition::optional("variables_filter", "names copied in"),
                OptionDefinition::optional("propagate_variables", "copy variables back out"),
                OptionDefinition::optional("variables_regexp", "names copied back out"),
                OptionDefinition::optional("scope_handling_storage", "empty, copy or share"),
                OptionDefinition::optional("storage_filter", "names copied in"),
                OptionDefinition::optional("propagate_storage", "copy storage back out"),
                OptionDefinition::optional("storage_regexp", "names copied back out"),
            ],
        ),
        TRY_CATCH => (
            ActorKind::Control,
            "Runs the catch child when the try child fails",
            vec![OptionDefinition::optional(
                "error_variable",
                "variable receiving the error message",
            )],
        ),
        CALLABLE_ACTORS => (
            ActorKind::Standalone,
            "Container of actors reachable through callable references",
            vec![],
        ),
        CALLABLE_SOURCE => (
            ActorKind::Source,
            "Drains the referenced callable actor",
            vec![OptionDefinition::required("callable", "name of the callable actor")],
        ),
        CALLABLE_TRANSFORMER => (
            ActorKind::Transformer,
            "Passes the token through the referenced callable actor",
            vec![OptionDefinition::required("callable", "name of the callable actor")],
        ),
        CALLABLE_SINK => (
            ActorKind::Sink,
            "Feeds the token to the referenced callable actor",
            vec![OptionDefinition::required("callable", "name of the callable actor")],
        ),
        _ => return None,
    };

    Some(ActorMetadata {
        description: description.to_string(),
        kind,
        options,
    })
}
