use crate::Options;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type FlowId = Uuid;

/// Complete, declarative flow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSpec {
    #[serde(default = "Uuid::new_v4")]
    pub id: FlowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Initial bindings of the root variable scope
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    /// Children of the root scope, in execution order
    #[serde(default)]
    pub actors: Vec<ActorSpec>,
    #[serde(default)]
    pub settings: FlowSettings,
}

impl FlowSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            variables: BTreeMap::new(),
            actors: Vec::new(),
            settings: FlowSettings::default(),
        }
    }

    pub fn with_actor(mut self, actor: ActorSpec) -> Self {
        self.actors.push(actor);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_settings(mut self, settings: FlowSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Finds an actor description by its slash-separated path below the root
    pub fn find_actor(&self, path: &str) -> Option<&ActorSpec> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut current = self.actors.iter().find(|a| a.name == first)?;
        for segment in segments {
            current = current.children.iter().find(|a| a.name == segment)?;
        }
        Some(current)
    }
}

/// Actor description in a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSpec {
    #[serde(rename = "type")]
    pub actor_type: String,
    /// Unique within the parent; defaults to the last segment of the type
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub options: Options,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ActorSpec>,
    #[serde(default = "default_true")]
    pub stop_flow_on_error: bool,
    #[serde(default)]
    pub skip: bool,
}

impl ActorSpec {
    pub fn new(actor_type: impl Into<String>) -> Self {
        Self {
            actor_type: actor_type.into(),
            name: String::new(),
            options: Options::new(),
            conditions: Vec::new(),
            children: Vec::new(),
            stop_flow_on_error: true,
            skip: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<crate::Value>) -> Self {
        self.options.insert(key, value);
        self
    }

    pub fn with_condition(mut self, condition: ConditionSpec) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_child(mut self, child: ActorSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = ActorSpec>) -> Self {
        self.children.extend(children);
        self
    }

    /// Log errors of this actor and drop the token instead of stopping
    pub fn tolerate_errors(mut self) -> Self {
        self.stop_flow_on_error = false;
        self
    }

    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    /// Name used in the tree: the explicit name or the type's last segment
    pub fn effective_name(&self) -> &str {
        if self.name.is_empty() {
            self.actor_type
                .rsplit('.')
                .next()
                .unwrap_or(self.actor_type.as_str())
        } else {
            &self.name
        }
    }
}

/// Boolean condition description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSpec {
    #[serde(rename = "type")]
    pub condition_type: String,
    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub options: Options,
}

impl ConditionSpec {
    pub fn new(condition_type: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            options: Options::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<crate::Value>) -> Self {
        self.options.insert(key, value);
        self
    }
}

/// Flow-wide settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowSettings {
    #[serde(default)]
    pub on_error: ErrorHandling,
}

/// What the runner does after a fatal error
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    #[default]
    StopFlow,
    RestartFlow { max_restarts: u32 },
}

fn default_true() -> bool {
    true
}
