use async_trait::async_trait;
use flowcore::{
    Actor, ActorContext, ActorKind, ExecutionError, ExecutionOutcome, Options, SetupError, Token,
    Value,
};
use flowruntime::{ActorFactory, ActorMetadata, OptionDefinition};
use tracing::debug;

/// Where a variable gets bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableTarget {
    /// Innermost scope enclosing the actor
    Local,
    /// The flow's root scope
    Root,
}

impl VariableTarget {
    fn from_options(options: &Options) -> Result<Self, SetupError> {
        match options.str_or("target", "local") {
            "local" => Ok(VariableTarget::Local),
            "root" => Ok(VariableTarget::Root),
            other => Err(SetupError::invalid_option(
                "target",
                format!("expected 'local' or 'root', got '{}'", other),
            )),
        }
    }
}

/// Binds `variable_name` to `value`.
///
/// As a standalone it runs once per scope invocation. As a transformer it
/// binds the option `value` if given, else the incoming payload, and forwards
/// its input unchanged.
pub struct SetVariable {
    kind: ActorKind,
    target: VariableTarget,
}

impl SetVariable {
    fn actor_type_for(kind: ActorKind) -> &'static str {
        match kind {
            ActorKind::Standalone => "standalone.set_variable",
            _ => "transformer.set_variable",
        }
    }
}

#[async_trait]
impl Actor for SetVariable {
    fn actor_type(&self) -> &str {
        Self::actor_type_for(self.kind)
    }

    fn kind(&self) -> ActorKind {
        self.kind
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let name = ctx.require_str("variable_name")?.to_string();
        let value = match (ctx.options().get("value"), &input) {
            (Some(value), _) => value.to_string(),
            (None, Some(token)) => token.payload().to_string(),
            (None, None) => return Err(SetupError::MissingOption("value".to_string()).into()),
        };

        debug!("{}: {} = {}", ctx.name(), name, value);
        match self.target {
            VariableTarget::Local => ctx.set_variable(name, value),
            VariableTarget::Root => ctx.set_root_variable(name, value),
        }

        Ok(match input {
            Some(token) => token.into(),
            None => ExecutionOutcome::NoOutput,
        })
    }
}

pub struct SetVariableFactory {
    kind: ActorKind,
}

impl SetVariableFactory {
    pub fn standalone() -> Self {
        Self {
            kind: ActorKind::Standalone,
        }
    }

    pub fn transformer() -> Self {
        Self {
            kind: ActorKind::Transformer,
        }
    }
}

impl ActorFactory for SetVariableFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        options.require_str("variable_name")?;
        if self.kind == ActorKind::Standalone {
            options.require("value")?;
        }
        Ok(Box::new(SetVariable {
            kind: self.kind,
            target: VariableTarget::from_options(options)?,
        }))
    }

    fn actor_type(&self) -> &str {
        SetVariable::actor_type_for(self.kind)
    }

    fn metadata(&self) -> ActorMetadata {
        let value = if self.kind == ActorKind::Standalone {
            OptionDefinition::required("value", "Value to bind")
        } else {
            OptionDefinition::optional("value", "Value to bind instead of the input payload")
        };
        ActorMetadata {
            description: "Binds a variable in the local or root scope".to_string(),
            kind: self.kind,
            options: vec![
                OptionDefinition::required("variable_name", "Variable to set"),
                value,
                OptionDefinition::optional("target", "'local' (default) or 'root'"),
            ],
        }
    }
}

/// Emits the current value of a variable once per scope invocation
#[derive(Default)]
pub struct VariableSource {
    done: bool,
}

#[async_trait]
impl Actor for VariableSource {
    fn actor_type(&self) -> &str {
        "source.variable"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Source
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        _input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        if self.done {
            return Ok(ExecutionOutcome::NoOutput);
        }
        let name = ctx.require_str("variable_name")?;
        let value = ctx.require_variable(name)?.to_string();
        self.done = true;
        Ok(Token::new(Value::String(value)).into())
    }

    fn reset(&mut self) {
        self.done = false;
    }
}

pub struct VariableSourceFactory;

impl ActorFactory for VariableSourceFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        options.require_str("variable_name")?;
        Ok(Box::new(VariableSource::default()))
    }

    fn actor_type(&self) -> &str {
        "source.variable"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Emits the value of a variable".to_string(),
            kind: ActorKind::Source,
            options: vec![OptionDefinition::required(
                "variable_name",
                "Variable to read",
            )],
        }
    }
}
