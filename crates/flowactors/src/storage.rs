use async_trait::async_trait;
use flowcore::{
    Actor, ActorContext, ActorKind, ExecutionError, ExecutionOutcome, Options, SetupError,
    StorageName, Token, Value,
};
use flowruntime::{ActorFactory, ActorMetadata, OptionDefinition};

/// Emits the content of a storage slot once per scope invocation
#[derive(Default)]
pub struct StorageValue {
    done: bool,
}

#[async_trait]
impl Actor for StorageValue {
    fn actor_type(&self) -> &str {
        "source.storage_value"
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
        let name = ctx.storage_name("storage_name")?;
        let value = ctx.get_storage(&name)?;
        self.done = true;
        Ok(Token::new(value).into())
    }

    fn reset(&mut self) {
        self.done = false;
    }
}

pub struct StorageValueFactory;

impl ActorFactory for StorageValueFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        options.require_str("storage_name")?;
        Ok(Box::new(StorageValue::default()))
    }

    fn actor_type(&self) -> &str {
        "source.storage_value"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Emits the value held in a storage slot".to_string(),
            kind: ActorKind::Source,
            options: vec![OptionDefinition::required(
                "storage_name",
                "Slot to read; 'global:' prefix for runtime-wide storage",
            )],
        }
    }
}

/// Stores the incoming payload and forwards the token
pub struct SetStorageValue;

#[async_trait]
impl Actor for SetStorageValue {
    fn actor_type(&self) -> &str {
        "transformer.set_storage_value"
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Transformer
    }

    async fn execute(
        &mut self,
        ctx: &mut ActorContext<'_>,
        input: Option<Token>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let token = input.ok_or_else(|| ExecutionError::invalid_input("token", "nothing"))?;
        let name = ctx.storage_name("storage_name")?;
        ctx.put_storage(&name, token.payload().clone());
        Ok(token.into())
    }
}

pub struct SetStorageValueFactory;

impl ActorFactory for SetStorageValueFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        options.require_str("storage_name")?;
        Ok(Box::new(SetStorageValue))
    }

    fn actor_type(&self) -> &str {
        "transformer.set_storage_value"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Writes the token payload into a storage slot".to_string(),
            kind: ActorKind::Transformer,
            options: vec![OptionDefinition::required(
                "storage_name",
                "Slot to write; 'global:' prefix for runtime-wide storage",
            )],
        }
    }
}

/// Reads every slot named in `storage_names` as an array
fn read_arrays(ctx: &ActorContext<'_>) -> Result<Vec<(String, Vec<Value>)>, ExecutionError> {
    ctx.options()
        .string_list("storage_names")?
        .iter()
        .map(|raw| {
            let name = StorageName::parse(raw)?;
            match ctx.get_storage(&name)? {
                Value::Array(items) => Ok((raw.clone(), items)),
                other => Err(ExecutionError::invalid_input(
                    format!("array in '{}'", raw),
                    other.type_name(),
                )),
            }
        })
        .collect()
}

fn require_storage_names(options: &Options) -> Result<(), SetupError> {
    if options.string_list("storage_names")?.is_empty() {
        return Err(SetupError::MissingOption("storage_names".to_string()));
    }
    Ok(())
}

/// Concatenation with the widening rule: a common element type is kept,
/// mixed element types all become strings
fn concat(arrays: Vec<Vec<Value>>) -> Vec<Value> {
    let items: Vec<Value> = arrays.into_iter().flatten().collect();
    let uniform = items
        .windows(2)
        .all(|pair| pair[0].type_name() == pair[1].type_name());
    if uniform {
        items
    } else {
        items
            .into_iter()
            .map(|item| match item {
                Value::String(_) => item,
                other => Value::String(other.to_string()),
            })
            .collect()
    }
}

/// Emits the arrays of several storage slots concatenated into one
#[derive(Default)]
pub struct CombineArrays {
    done: bool,
}

#[async_trait]
impl Actor for CombineArrays {
    fn actor_type(&self) -> &str {
        "source.combine_arrays"
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
        let arrays = read_arrays(ctx)?;
        self.done = true;
        let combined = concat(arrays.into_iter().map(|(_, items)| items).collect());
        Ok(Token::new(Value::Array(combined)).into())
    }

    fn reset(&mut self) {
        self.done = false;
    }
}

pub struct CombineArraysFactory;

impl ActorFactory for CombineArraysFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        require_storage_names(options)?;
        Ok(Box::new(CombineArrays::default()))
    }

    fn actor_type(&self) -> &str {
        "source.combine_arrays"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Concatenates arrays held in storage".to_string(),
            kind: ActorKind::Source,
            options: vec![OptionDefinition::required(
                "storage_names",
                "Slots holding the arrays, in output order",
            )],
        }
    }
}

/// Emits one tuple per index across the arrays of several storage slots
#[derive(Default)]
pub struct ZipArrays {
    done: bool,
}

#[async_trait]
impl Actor for ZipArrays {
    fn actor_type(&self) -> &str {
        "source.zip_arrays"
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
        let arrays = read_arrays(ctx)?;
        let expected = arrays.first().map(|(_, items)| items.len()).unwrap_or(0);
        if let Some((name, items)) = arrays.iter().find(|(_, items)| items.len() != expected) {
            return Err(ExecutionError::LengthMismatch {
                name: name.clone(),
                expected,
                actual: items.len(),
            });
        }

        self.done = true;
        let tuples = (0..expected)
            .map(|i| Value::Array(arrays.iter().map(|(_, items)| items[i].clone()).collect()))
            .collect();
        Ok(Token::new(Value::Array(tuples)).into())
    }

    fn reset(&mut self) {
        self.done = false;
    }
}

pub struct ZipArraysFactory;

impl ActorFactory for ZipArraysFactory {
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError> {
        require_storage_names(options)?;
        Ok(Box::new(ZipArrays::default()))
    }

    fn actor_type(&self) -> &str {
        "source.zip_arrays"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Zips arrays held in storage into tuples".to_string(),
            kind: ActorKind::Source,
            options: vec![OptionDefinition::required(
                "storage_names",
                "Slots holding arrays of equal length",
            )],
        }
    }
}
