use async_trait::async_trait;
use flowcore::{
    Actor, ActorContext, ActorKind, ExecutionError, ExecutionOutcome, Options, SetupError, Token,
    Value,
};
use flowruntime::{ActorFactory, ActorMetadata, OptionDefinition};
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Delays each token for a specified duration, then forwards it
pub struct Delay;

#[async_trait]
impl Actor for Delay {
    fn actor_type(&self) -> &str {
        "transformer.delay"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Transformer
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        // Default to 1 second if not specified
        let delay_ms = ctx.options().u64_or("delay_ms", 1000)?;

        debug!("{}: delaying for {}ms", ctx.name(), delay_ms);
        ctx.sleep(Duration::from_millis(delay_ms)).await?;

        Ok(match input {
            Some(token) => token.into(),
            None => ExecutionOutcome::NoOutput,
        })
    }
}

pub struct DelayFactory;

impl ActorFactory for DelayFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        if !options.is_variable("delay_ms") {
            options.u64_or("delay_ms", 1000)?;
        }
        Ok(Box::new(Delay))
    }

    fn actor_type(&self) -> &str {
        "transformer.delay"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Delay each token for specified milliseconds".to_string(),
            kind: ActorKind::Transformer,
            options: vec![OptionDefinition::optional(
                "delay_ms",
                "Delay in milliseconds (default 1000)",
            )],
        }
    }
}

/// Emits a counter every `interval_ms` until `count` tokens were produced
/// or the next tick would exceed `budget_ms`. Without either limit it runs
/// until the flow gets stopped.
pub struct TimedSource {
    interval: Duration,
    count: Option<u64>,
    budget: Option<Duration>,
    emitted: u64,
    started: Option<Instant>,
}

impl TimedSource {
    fn from_options(options: &Options) -> Result<Self, SetupError> {
        let limit = |name: &str| -> Result<Option<u64>, SetupError> {
            match options.get(name) {
                None => Ok(None),
                Some(_) => options.u64_or(name, 0).map(Some),
            }
        };
        Ok(Self {
            interval: Duration::from_millis(options.u64_or("interval_ms", 1000)?),
            count: limit("count")?,
            budget: limit("budget_ms")?.map(Duration::from_millis),
            emitted: 0,
            started: None,
        })
    }

    fn exhausted(&self, started: Instant) -> bool {
        let counted_out = self.count.map_or(false, |count| self.emitted >= count);
        let over_budget = self
            .budget
            .map_or(false, |budget| started.elapsed() + self.interval > budget);
        counted_out || over_budget
    }
}

#[async_trait]
impl Actor for TimedSource {
    fn actor_type(&self) -> &str {
        "source.timed"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Source
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        _input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let started = *self.started.get_or_insert_with(Instant::now);
        if self.exhausted(started) {
            return Ok(ExecutionOutcome::NoOutput);
        }

        ctx.sleep(self.interval).await?;
        let tick = self.emitted;
        self.emitted += 1;
        Ok(Token::new(Value::Integer(tick as i64)).into())
    }

    fn reset(&mut self) {
        self.emitted = 0;
        self.started = None;
    }
}

pub struct TimedSourceFactory;

impl ActorFactory for TimedSourceFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        Ok(Box::new(TimedSource::from_options(options)?))
    }

    fn actor_type(&self) -> &str {
        "source.timed"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Emits a counter at a fixed interval".to_string(),
            kind: ActorKind::Source,
            options: vec![
                OptionDefinition::optional("interval_ms", "Time between tokens (default 1000)"),
                OptionDefinition::optional("count", "Number of tokens to emit"),
                OptionDefinition::optional("budget_ms", "Total time the source may run"),
            ],
        }
    }
}
