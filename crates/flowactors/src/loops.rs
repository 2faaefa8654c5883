use async_trait::async_trait;
use flowcore::{
    Actor, ActorContext, ActorKind, ExecutionError, ExecutionOutcome, Options, SetupError, Token,
    Value,
};
use flowruntime::{ActorFactory, ActorMetadata, OptionDefinition};

/// Emits a single `Null` token per scope invocation
#[derive(Default)]
pub struct Start {
    done: bool,
}

#[async_trait]
impl Actor for Start {
    fn actor_type(&self) -> &str {
        "source.start"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Source
    }

    async fn execute(
        &mut self,
        _ctx: &mut ActorContext<'_>,
        _input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        if self.done {
            return Ok(ExecutionOutcome::NoOutput);
        }
        self.done = true;
        Ok(Token::new(Value::Null).into())
    }

    fn reset(&mut self) {
        self.done = false;
    }
}

pub struct StartFactory;

impl ActorFactory for StartFactory {
    fn create(&self, _options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        Ok(Box::new(Start::default()))
    }

    fn actor_type(&self) -> &str {
        "source.start"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Emits one empty token to kick off a pipeline".to_string(),
            kind: ActorKind::Source,
            options: vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    lower: i64,
    upper: i64,
    step: i64,
}

impl Bounds {
    fn from_options(options: &Options) -> Result<Self, SetupError> {
        let bounds = Bounds {
            lower: options.i64_or("lower", 1)?,
            upper: options.i64_or("upper", 10)?,
            step: options.i64_or("step", 1)?,
        };
        if bounds.step == 0 {
            return Err(SetupError::invalid_option("step", "must not be zero"));
        }
        Ok(bounds)
    }

    fn contains(&self, value: i64) -> bool {
        if self.step > 0 {
            value <= self.upper
        } else {
            value >= self.upper
        }
    }

    fn after(&self, value: i64) -> Option<i64> {
        value.checked_add(self.step)
    }

    fn values(&self) -> Vec<Value> {
        let mut values = Vec::new();
        let mut next = Some(self.lower);
        while let Some(value) = next.filter(|v| self.contains(*v)) {
            values.push(Value::Integer(value));
            next = self.after(value);
        }
        values
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Pending,
    Emitting { next: i64 },
    Exhausted,
}

/// Counts from `lower` to `upper` (inclusive) in increments of `step`.
///
/// Emits one integer per call, or a single array token holding the whole
/// sequence when `output_array` is set. Bounds are read on the first call
/// after a reset so they may come from variables.
pub struct ForLoop {
    output_array: bool,
    state: LoopState,
}

impl ForLoop {
    pub fn new(output_array: bool) -> Self {
        Self {
            output_array,
            state: LoopState::Pending,
        }
    }
}

#[async_trait]
impl Actor for ForLoop {
    fn actor_type(&self) -> &str {
        "source.for_loop"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Source
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        _input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let bounds = Bounds::from_options(ctx.options())?;
        let next = match self.state {
            LoopState::Exhausted => return Ok(ExecutionOutcome::NoOutput),
            LoopState::Pending if self.output_array => {
                self.state = LoopState::Exhausted;
                return Ok(Token::new(Value::Array(bounds.values())).into());
            }
            LoopState::Pending => bounds.lower,
            LoopState::Emitting { next } => next,
        };

        if !bounds.contains(next) {
            self.state = LoopState::Exhausted;
            return Ok(ExecutionOutcome::NoOutput);
        }
        self.state = match bounds.after(next) {
            Some(next) => LoopState::Emitting { next },
            None => LoopState::Exhausted,
        };
        Ok(Token::new(Value::Integer(next)).into())
    }

    fn reset(&mut self) {
        self.state = LoopState::Pending;
    }
}

pub struct ForLoopFactory;

impl ActorFactory for ForLoopFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        if !["lower", "upper", "step"]
            .iter()
            .any(|name| options.is_variable(name))
        {
            Bounds::from_options(options)?;
        }
        Ok(Box::new(ForLoop::new(options.bool_or("output_array", false)?)))
    }

    fn actor_type(&self) -> &str {
        "source.for_loop"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Emits integers from lower to upper".to_string(),
            kind: ActorKind::Source,
            options: vec![
                OptionDefinition::optional("lower", "First value (default 1)"),
                OptionDefinition::optional("upper", "Last value, inclusive (default 10)"),
                OptionDefinition::optional("step", "Increment, may be negative (default 1)"),
                OptionDefinition::optional("output_array", "Emit the sequence as one array"),
            ],
        }
    }
}

/// Emits each configured string, or all of them as one array
pub struct StringConstants {
    output_array: bool,
    next: usize,
}

#[async_trait]
impl Actor for StringConstants {
    fn actor_type(&self) -> &str {
        "source.string_constants"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Source
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        _input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let strings = ctx.options().string_list("strings")?;
        if self.output_array {
            if self.next > 0 {
                return Ok(ExecutionOutcome::NoOutput);
            }
            self.next = strings.len().max(1);
            return Ok(Token::new(Value::from(strings)).into());
        }

        match strings.into_iter().nth(self.next) {
            Some(s) => {
                self.next += 1;
                Ok(Token::new(Value::String(s)).into())
            }
            None => Ok(ExecutionOutcome::NoOutput),
        }
    }

    fn reset(&mut self) {
        self.next = 0;
    }
}

pub struct StringConstantsFactory;

impl ActorFactory for StringConstantsFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        options.require("strings")?;
        options.string_list("strings")?;
        Ok(Box::new(StringConstants {
            output_array: options.bool_or("output_array", false)?,
            next: 0,
        }))
    }

    fn actor_type(&self) -> &str {
        "source.string_constants"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Emits a fixed list of strings".to_string(),
            kind: ActorKind::Source,
            options: vec![
                OptionDefinition::required("strings", "Strings to emit"),
                OptionDefinition::optional("output_array", "Emit all strings as one array"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(lower: i64, upper: i64, step: i64) -> Bounds {
        Bounds { lower, upper, step }
    }

    #[test]
    fn descending_loops_include_upper() {
        assert_eq!(
            bounds(5, 1, -2).values(),
            vec![Value::Integer(5), Value::Integer(3), Value::Integer(1)]
        );
    }

    #[test]
    fn empty_range() {
        assert!(bounds(3, 1, 1).values().is_empty());
    }

    #[test]
    fn stops_before_overflow() {
        assert_eq!(bounds(i64::MAX - 1, i64::MAX, 5).values().len(), 1);
    }

    #[test]
    fn zero_step_is_rejected() {
        let options = Options::new().with("step", 0);
        assert!(matches!(
            Bounds::from_options(&options),
            Err(SetupError::InvalidOption { .. })
        ));
    }
}
