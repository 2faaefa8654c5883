use crate::control;
use flowcore::{Actor, ActorKind, Condition, Options, SetupError};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating leaf actor instances
pub trait ActorFactory: Send + Sync {
    /// Create a new instance of the actor with given options
    fn create(&self, options: &Options) -> Result<Box<dyn Actor>, SetupError>;

    /// Get actor type identifier
    fn actor_type(&self) -> &str;

    /// Optional: Get actor metadata (description, kind, options)
    fn metadata(&self) -> ActorMetadata {
        ActorMetadata::default()
    }
}

/// Factory trait for boolean conditions
pub trait ConditionFactory: Send + Sync {
    fn create(&self, options: &Options) -> Result<Box<dyn Condition>, SetupError>;

    fn condition_type(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }
}

/// Metadata about an actor type
#[derive(Debug, Clone)]
pub struct ActorMetadata {
    pub description: String,
    pub kind: ActorKind,
    pub options: Vec<OptionDefinition>,
}

impl Default for ActorMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            kind: ActorKind::Transformer,
            options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptionDefinition {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl OptionDefinition {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: false,
        }
    }
}

/// Registry of available leaf actor and condition types
pub struct ActorRegistry {
    factories: HashMap<String, Arc<dyn ActorFactory>>,
    conditions: HashMap<String, Arc<dyn ConditionFactory>>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            conditions: HashMap::new(),
        }
    }

    /// Register an actor factory
    pub fn register(&mut self, factory: Arc<dyn ActorFactory>) {
        let actor_type = factory.actor_type().to_string();
        tracing::debug!("Registering actor type: {}", actor_type);
        self.factories.insert(actor_type, factory);
    }

    /// Register a condition factory
    pub fn register_condition(&mut self, factory: Arc<dyn ConditionFactory>) {
        let condition_type = factory.condition_type().to_string();
        tracing::debug!("Registering condition type: {}", condition_type);
        self.conditions.insert(condition_type, factory);
    }

    /// Create a leaf actor instance from a type and options
    pub fn create_actor(
        &self,
        actor_type: &str,
        options: &Options,
    ) -> Result<Box<dyn Actor>, SetupError> {
        let factory = self
            .factories
            .get(actor_type)
            .ok_or_else(|| SetupError::UnknownActorType(actor_type.to_string()))?;

        factory.create(options)
    }

    pub fn create_condition(
        &self,
        condition_type: &str,
        options: &Options,
    ) -> Result<Box<dyn Condition>, SetupError> {
        let factory = self
            .conditions
            .get(condition_type)
            .ok_or_else(|| SetupError::UnknownConditionType(condition_type.to_string()))?;

        factory.create(options)
    }

    pub fn contains(&self, actor_type: &str) -> bool {
        control::is_control_type(actor_type) || self.factories.contains_key(actor_type)
    }

    /// Get all actor types, built-in control actors included, sorted
    pub fn list_actor_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .factories
            .keys()
            .cloned()
            .chain(control::CONTROL_TYPES.iter().map(|t| t.to_string()))
            .collect();
        types.sort();
        types
    }

    pub fn list_condition_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.conditions.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for an actor type
    pub fn get_metadata(&self, actor_type: &str) -> Option<ActorMetadata> {
        control::metadata(actor_type)
            .or_else(|| self.factories.get(actor_type).map(|f| f.metadata()))
    }

    pub fn condition_description(&self, condition_type: &str) -> Option<String> {
        self.conditions
            .get(condition_type)
            .map(|f| f.description().to_string())
    }
}

impl Default for ActorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
