use async_trait::async_trait;
use flowcore::{
    Actor, ActorContext, ActorKind, ExecutionError, ExecutionOutcome, Options, SetupError, Token,
};
use flowruntime::{ActorFactory, ActorMetadata, OptionDefinition};
use tracing::info;

/// Discards every token
pub struct NullSink;

#[async_trait]
impl Actor for NullSink {
    fn actor_type(&self) -> &str {
        "sink.null"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Sink
    }

    async fn execute(
        &mut self,
        _ctx: &mut ActorContext<'_>,
        _input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        Ok(ExecutionOutcome::NoOutput)
    }
}

pub struct NullSinkFactory;

impl ActorFactory for NullSinkFactory {
    fn create(&self, _options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        Ok(Box::new(NullSink))
    }

    fn actor_type(&self) -> &str {
        "sink.null"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Discards tokens".to_string(),
            kind: ActorKind::Sink,
            options: vec![],
        }
    }
}

/// Simple debug sink that logs every token it receives
pub struct LogSink;

#[async_trait]
impl Actor for LogSink {
    fn actor_type(&self) -> &str {
        "sink.log"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Sink
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let prefix = ctx.options().str_or("prefix", "DEBUG");
        match &input {
            Some(token) => info!(
                actor = ctx.name(),
                from = token.provenance().unwrap_or("-"),
                "{}: {}",
                prefix,
                token.payload()
            ),
            None => info!(actor = ctx.name(), "{}: (no token)", prefix),
        }
        Ok(ExecutionOutcome::NoOutput)
    }
}

pub struct LogSinkFactory;

impl ActorFactory for LogSinkFactory {
    fn create(&self, _options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        Ok(Box::new(LogSink))
    }

    fn actor_type(&self) -> &str {
        "sink.log"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Logs token payloads for debugging".to_string(),
            kind: ActorKind::Sink,
            options: vec![OptionDefinition::optional(
                "prefix",
                "Text in front of each logged payload (default DEBUG)",
            )],
        }
    }
}
