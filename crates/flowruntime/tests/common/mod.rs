#![allow(dead_code)]

use async_trait::async_trait;
use flowcore::{
    Actor, ActorContext, ActorInfo, ActorKind, Condition, ConditionContext, ExecutionError,
    ExecutionListener, ExecutionOutcome, FlowInfo, FlowOutcome, Options, SetupError, StorageName,
    Token, Value,
};
use flowruntime::{ActorFactory, ActorRegistry, ConditionFactory, FlowRuntime, RuntimeConfig};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Build = dyn Fn(&Options) -> Result<Box<dyn Actor>, SetupError> + Send + Sync;

struct FnFactory {
    actor_type: &'static str,
    build: Box<Build>,
}

impl ActorFactory for FnFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        (self.build)(options)
    }

    fn actor_type(&self) -> &str {
        self.actor_type
    }
}

fn factory(
    actor_type: &'static str,
    build: impl Fn(&Options) -> Result<Box<dyn Actor>, SetupError> + Send + Sync + 'static,
) -> Arc<dyn ActorFactory> {
    Arc::new(FnFactory {
        actor_type,
        build: Box::new(build),
    })
}

/// Emits the elements of option `values`, one per call
struct Numbers {
    next: usize,
}

#[async_trait]
impl Actor for Numbers {
    fn actor_type(&self) -> &str {
        "test.numbers"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Source
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        _input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let values = ctx
            .options()
            .get("values")
            .and_then(|v| v.as_array())
            .map(|v| v.to_vec())
            .unwrap_or_default();
        match values.get(self.next) {
            Some(value) => {
                self.next += 1;
                Ok(Token::new(value.clone()).into())
            }
            None => Ok(ExecutionOutcome::NoOutput),
        }
    }

    fn reset(&mut self) {
        self.next = 0;
    }
}

/// Emits option `value` once
struct Constant {
    done: bool,
}

#[async_trait]
impl Actor for Constant {
    fn actor_type(&self) -> &str {
        "test.constant"
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
        self.done = true;
        let value = ctx.options().get("value").cloned().unwrap_or(Value::Null);
        Ok(Token::new(value).into())
    }

    fn reset(&mut self) {
        self.done = false;
    }
}

/// Emits 0, 1, 2, ... with a short sleep in between, forever
struct Forever {
    next: i64,
}

#[async_trait]
impl Actor for Forever {
    fn actor_type(&self) -> &str {
        "test.forever"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Source
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        _input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        ctx.sleep(std::time::Duration::from_millis(2)).await?;
        self.next += 1;
        Ok(Token::new(self.next).into())
    }
}

/// Emits 1..=`emit`, then fails
struct Broken {
    next: i64,
}

#[async_trait]
impl Actor for Broken {
    fn actor_type(&self) -> &str {
        "test.broken"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Source
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        _input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let emit = ctx.options().get("emit").and_then(|v| v.as_i64()).unwrap_or(1);
        if self.next >= emit {
            return Err(ExecutionError::Failed("source broke".to_string()));
        }
        self.next += 1;
        Ok(Token::new(self.next).into())
    }

    fn reset(&mut self) {
        self.next = 0;
    }
}

/// Multiplies numeric payloads by two
struct Double;

#[async_trait]
impl Actor for Double {
    fn actor_type(&self) -> &str {
        "test.double"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Transformer
    }

    async fn execute(
        &mut self,
        _ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let token = input.ok_or_else(|| ExecutionError::Contract("no input".into()))?;
        let value = token
            .payload()
            .as_i64()
            .ok_or_else(|| ExecutionError::invalid_input("integer", token.payload().type_name()))?;
        Ok(Token::new(value * 2).into())
    }
}

/// Fails for payloads equal to option `on`, passes everything else
struct Fail;

#[async_trait]
impl Actor for Fail {
    fn actor_type(&self) -> &str {
        "test.fail"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Transformer
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let token = input.ok_or_else(|| ExecutionError::Contract("no input".into()))?;
        if ctx.options().get("on") == Some(token.payload()) {
            return Err(ExecutionError::Failed("boom".to_string()));
        }
        Ok(token.into())
    }
}

/// Fails while the shared counter is below option `failures`
struct Flaky {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Actor for Flaky {
    fn actor_type(&self) -> &str {
        "test.flaky"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Transformer
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let failures = ctx.options().get("failures").and_then(|v| v.as_i64()).unwrap_or(1);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) as i64;
        if attempt < failures {
            return Err(ExecutionError::Failed(format!("attempt {}", attempt)));
        }
        Ok(input.map(ExecutionOutcome::from).unwrap_or(ExecutionOutcome::NoOutput))
    }
}

/// Binds variable `name` to the payload and forwards the token
struct Remember;

#[async_trait]
impl Actor for Remember {
    fn actor_type(&self) -> &str {
        "test.remember"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Transformer
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let token = input.ok_or_else(|| ExecutionError::Contract("no input".into()))?;
        let name = ctx.require_str("name")?.to_string();
        ctx.set_variable(name, token.payload().to_string());
        Ok(token.into())
    }
}

/// Stores the payload under option `storage_name`
struct Store;

#[async_trait]
impl Actor for Store {
    fn actor_type(&self) -> &str {
        "test.store"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Transformer
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let token = input.ok_or_else(|| ExecutionError::Contract("no input".into()))?;
        let name = ctx.storage_name("storage_name")?;
        ctx.put_storage(&name, token.payload().clone());
        Ok(token.into())
    }
}

/// Emits the storage value under option `storage_name`, or "missing"
struct Peek {
    done: bool,
}

#[async_trait]
impl Actor for Peek {
    fn actor_type(&self) -> &str {
        "test.peek"
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
        self.done = true;
        let name = ctx.storage_name("storage_name")?;
        let value = ctx
            .get_storage(&name)
            .unwrap_or_else(|_| Value::from("missing"));
        Ok(Token::new(value).into())
    }

    fn reset(&mut self) {
        self.done = false;
    }
}

/// Appends tokens to bucket `bucket` (default "out")
struct Collect {
    buckets: Buckets,
}

#[async_trait]
impl Actor for Collect {
    fn actor_type(&self) -> &str {
        "test.collect"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Sink
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let token = input.ok_or_else(|| ExecutionError::Contract("no input".into()))?;
        let bucket = ctx.options().str_or("bucket", "out").to_string();
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket)
            .or_default()
            .push(token);
        Ok(ExecutionOutcome::NoOutput)
    }
}

/// Passes tokens through and records set up / wrap up calls
struct Lifecycle {
    name: String,
    fail_set_up: bool,
    log: Log,
}

#[async_trait]
impl Actor for Lifecycle {
    fn actor_type(&self) -> &str {
        "test.lifecycle"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Transformer
    }

    async fn set_up(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), SetupError> {
        self.name = ctx.name().to_string();
        self.log.lock().unwrap().push(format!("set_up {}", self.name));
        if self.fail_set_up {
            return Err(SetupError::invalid_option("fail_set_up", "requested"));
        }
        Ok(())
    }

    async fn execute(
        &mut self,
        _ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        Ok(input.map(ExecutionOutcome::from).unwrap_or(ExecutionOutcome::NoOutput))
    }

    async fn wrap_up(&mut self) {
        self.log.lock().unwrap().push(format!("wrap_up {}", self.name));
    }
}

/// True when the payload is greater than option `value`
struct Greater {
    value: f64,
}

impl Condition for Greater {
    fn condition_type(&self) -> &str {
        "test.greater"
    }

    fn evaluate(
        &mut self,
        _ctx: &ConditionContext<'_>,
        token: Option<&Token>,
    ) -> Result<bool, ExecutionError> {
        Ok(token
            .and_then(|t| t.payload().as_f64())
            .map_or(false, |v| v > self.value))
    }
}

/// True on the 1st, 3rd, 5th, ... evaluation since the last reset
struct EveryOther {
    count: usize,
}

impl Condition for EveryOther {
    fn condition_type(&self) -> &str {
        "test.every_other"
    }

    fn evaluate(
        &mut self,
        _ctx: &ConditionContext<'_>,
        _token: Option<&Token>,
    ) -> Result<bool, ExecutionError> {
        self.count += 1;
        Ok(self.count % 2 == 1)
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

struct GreaterFactory;

impl ConditionFactory for GreaterFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Condition>, SetupError> {
        let value = options
            .require("value")?
            .as_f64()
            .ok_or_else(|| SetupError::invalid_option("value", "not a number"))?;
        Ok(Box::new(Greater { value }))
    }

    fn condition_type(&self) -> &str {
        "test.greater"
    }
}

struct EveryOtherFactory;

impl ConditionFactory for EveryOtherFactory {
    fn create(&self, _options: &Options) -> Result<Box<dyn Condition>, SetupError> {
        Ok(Box::new(EveryOther { count: 0 }))
    }

    fn condition_type(&self) -> &str {
        "test.every_other"
    }
}

pub type Buckets = Arc<Mutex<BTreeMap<String, Vec<Token>>>>;
pub type Log = Arc<Mutex<Vec<String>>>;

/// Registry with the test actors plus handles on what they observed
pub struct Fixture {
    pub registry: ActorRegistry,
    pub buckets: Buckets,
    pub log: Log,
    pub attempts: Arc<AtomicUsize>,
}

impl Fixture {
    pub fn new() -> Self {
        let buckets: Buckets = Arc::default();
        let log: Log = Arc::default();
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut registry = ActorRegistry::new();

        registry.register(factory("test.numbers", |_| Ok(Box::new(Numbers { next: 0 }))));
        registry.register(factory("test.constant", |_| Ok(Box::new(Constant { done: false }))));
        registry.register(factory("test.forever", |_| Ok(Box::new(Forever { next: 0 }))));
        registry.register(factory("test.broken", |_| Ok(Box::new(Broken { next: 0 }))));
        registry.register(factory("test.double", |_| Ok(Box::new(Double))));
        registry.register(factory("test.fail", |_| Ok(Box::new(Fail))));
        registry.register(factory("test.remember", |_| Ok(Box::new(Remember))));
        registry.register(factory("test.store", |_| Ok(Box::new(Store))));
        registry.register(factory("test.peek", |_| Ok(Box::new(Peek { done: false }))));

        let shared = attempts.clone();
        registry.register(factory("test.flaky", move |_| {
            Ok(Box::new(Flaky {
                attempts: shared.clone(),
            }))
        }));

        let shared = buckets.clone();
        registry.register(factory("test.collect", move |_| {
            Ok(Box::new(Collect {
                buckets: shared.clone(),
            }))
        }));

        let shared = log.clone();
        registry.register(factory("test.lifecycle", move |options| {
            Ok(Box::new(Lifecycle {
                name: String::new(),
                fail_set_up: options.bool_or("fail_set_up", false)?,
                log: shared.clone(),
            }))
        }));

        registry.register_condition(Arc::new(GreaterFactory));
        registry.register_condition(Arc::new(EveryOtherFactory));

        Self {
            registry,
            buckets,
            log,
            attempts,
        }
    }

    /// Payloads collected into `bucket`
    pub fn collected(&self, bucket: &str) -> Vec<Value> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|tokens| tokens.iter().map(|t| t.payload().clone()).collect())
            .unwrap_or_default()
    }

    pub fn tokens(&self, bucket: &str) -> Vec<Token> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .cloned()
            .unwrap_or_default()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Moves the registry into a runtime, keeping the observation handles
    pub fn runtime(&mut self) -> FlowRuntime {
        let registry = std::mem::take(&mut self.registry);
        FlowRuntime::with_registry(Arc::new(registry), RuntimeConfig::default())
    }
}

/// Listener recording everything it hears
#[derive(Default)]
pub struct Recorder {
    pub tokens: Mutex<Vec<(String, Value)>>,
    pub errors: Mutex<Vec<(String, ExecutionError)>>,
    pub starts: Mutex<Vec<FlowInfo>>,
    pub outcomes: Mutex<Vec<FlowOutcome>>,
}

impl ExecutionListener for Recorder {
    fn on_start(&self, flow: &FlowInfo) {
        self.starts.lock().unwrap().push(flow.clone());
    }

    fn on_token(&self, actor: &ActorInfo, token: &Token) {
        self.tokens
            .lock()
            .unwrap()
            .push((actor.name.clone(), token.payload().clone()));
    }

    fn on_error(&self, actor: &ActorInfo, error: &ExecutionError) {
        self.errors
            .lock()
            .unwrap()
            .push((actor.name.clone(), error.clone()));
    }

    fn on_finish(&self, _flow: &FlowInfo, outcome: &FlowOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}

pub fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|v| Value::from(*v)).collect()
}

pub fn numbers(values: &[i64]) -> flowcore::ActorSpec {
    flowcore::ActorSpec::new("test.numbers").with_option("values", Value::Array(ints(values)))
}

pub fn storage(name: &str) -> StorageName {
    StorageName::flow(name)
}
