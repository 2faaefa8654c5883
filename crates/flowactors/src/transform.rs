use async_trait::async_trait;
use flowcore::{
    Actor, ActorContext, ActorKind, ExecutionError, ExecutionOutcome, Options, SetupError, Token,
    Value,
};
use flowruntime::{ActorFactory, ActorMetadata, OptionDefinition};

fn require_token(input: Option<Token>) -> Result<Token, ExecutionError> {
    input.ok_or_else(|| ExecutionError::invalid_input("token", "nothing"))
}

/// Forwards its input unchanged
pub struct PassThrough;

#[async_trait]
impl Actor for PassThrough {
    fn actor_type(&self) -> &str {
        "transformer.pass_through"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Transformer
    }

    async fn execute(
        &mut self,
        _ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        Ok(require_token(input)?.into())
    }
}

pub struct PassThroughFactory;

impl ActorFactory for PassThroughFactory {
    fn create(&self, _options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        Ok(Box::new(PassThrough))
    }

    fn actor_type(&self) -> &str {
        "transformer.pass_through"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Forwards tokens unchanged".to_string(),
            kind: ActorKind::Transformer,
            options: vec![],
        }
    }
}

/// Splits an array payload into one token per element
pub struct ArrayToSequence;

#[async_trait]
impl Actor for ArrayToSequence {
    fn actor_type(&self) -> &str {
        "transformer.array_to_sequence"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Transformer
    }

    async fn execute(
        &mut self,
        _ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        match require_token(input)?.into_payload() {
            Value::Array(items) => Ok(ExecutionOutcome::MultiOutput(
                items.into_iter().map(Token::new).collect(),
            )),
            other => Err(ExecutionError::invalid_input("array", other.type_name())),
        }
    }
}

pub struct ArrayToSequenceFactory;

impl ActorFactory for ArrayToSequenceFactory {
    fn create(&self, _options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        Ok(Box::new(ArrayToSequence))
    }

    fn actor_type(&self) -> &str {
        "transformer.array_to_sequence"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Emits each element of an array as its own token".to_string(),
            kind: ActorKind::Transformer,
            options: vec![],
        }
    }
}

/// Renders `template` with `{payload}` replaced by the token payload.
/// Variables in the template are already expanded when it runs.
pub struct Format;

#[async_trait]
impl Actor for Format {
    fn actor_type(&self) -> &str {
        "transformer.format"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Transformer
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let token = require_token(input)?;
        let rendered = ctx
            .require_str("template")?
            .replace("{payload}", &token.payload().to_string());
        Ok(Token::new(Value::String(rendered)).into())
    }
}

pub struct FormatFactory;

impl ActorFactory for FormatFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        options.require_str("template")?;
        Ok(Box::new(Format))
    }

    fn actor_type(&self) -> &str {
        "transformer.format"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Formats the payload into a string template".to_string(),
            kind: ActorKind::Transformer,
            options: vec![OptionDefinition::required(
                "template",
                "Text with a {payload} placeholder",
            )],
        }
    }
}
