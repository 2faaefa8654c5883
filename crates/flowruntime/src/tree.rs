//! Arena representation of a flow's actor tree.
//!
//! Nodes live in one vector and refer to each other by [`NodeId`]; children
//! hold ordered ids, every node keeps its parent id. Nodes are pushed parent
//! first, so index order is pre-order.

use crate::control::{self, CallableRole, ControlActor};
use crate::registry::ActorRegistry;
use flowcore::{Actor, ActorKind, ActorSpec, FlowSpec, Options, ScopeId, SetupError, VariableScopes};
use std::collections::HashSet;

const DEFAULT_ROOT_NAME: &str = "flow";

/// Index of a node in an [`ActorTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Whether an actor consumes a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    None,
    Optional,
    Required,
}

/// Input/output signature of a node, used for structural checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub input: InputMode,
    pub output: bool,
}

impl Shape {
    pub const fn new(input: InputMode, output: bool) -> Self {
        Self { input, output }
    }

    pub fn of_kind(kind: ActorKind) -> Self {
        match kind {
            ActorKind::Standalone => Shape::new(InputMode::None, false),
            ActorKind::Source => Shape::new(InputMode::None, true),
            ActorKind::Transformer => Shape::new(InputMode::Required, true),
            ActorKind::Sink => Shape::new(InputMode::Required, false),
            ActorKind::Control => Shape::new(InputMode::Optional, true),
        }
    }

    /// Neither consumes nor produces tokens
    pub fn is_standalone(&self) -> bool {
        self.input == InputMode::None && !self.output
    }

    /// Can run without a token at the start of a scope, before its pipeline
    pub fn runs_standalone(&self) -> bool {
        self.input != InputMode::Required && !self.output
    }
}

pub enum Behavior {
    Leaf(Box<dyn Actor>),
    Control(ControlActor),
}

/// One actor in the tree
pub struct ActorNode {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) actor_type: String,
    pub(crate) kind: ActorKind,
    pub(crate) shape: Shape,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// Scope the actor's own options resolve against
    pub(crate) scope: ScopeId,
    /// Scope owned by the actor for its children, if it opens one
    pub(crate) own_scope: Option<ScopeId>,
    pub(crate) options: Options,
    pub(crate) stop_flow_on_error: bool,
    pub(crate) skip: bool,
    pub(crate) behavior: Behavior,
    pub(crate) initialized: bool,
}

impl ActorNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slash-separated path from the root
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn actor_type(&self) -> &str {
        &self.actor_type
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn stop_flow_on_error(&self) -> bool {
        self.stop_flow_on_error
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn control(&self) -> Option<&ControlActor> {
        match &self.behavior {
            Behavior::Control(control) => Some(control),
            Behavior::Leaf(_) => None,
        }
    }

    /// Leaf sources are drained rather than invoked once
    pub fn is_leaf_source(&self) -> bool {
        matches!(self.behavior, Behavior::Leaf(_)) && self.kind == ActorKind::Source
    }
}

/// The actor tree of one flow instance
pub struct ActorTree {
    nodes: Vec<ActorNode>,
}

impl ActorTree {
    /// Instantiates every actor of `spec` and checks the tree's structure.
    ///
    /// Scope-opening actors get a frame in `variables`; the root sequence
    /// owns the root frame.
    pub fn build(
        spec: &FlowSpec,
        registry: &ActorRegistry,
        variables: &mut VariableScopes,
    ) -> Result<Self, SetupError> {
        let root_scope = variables.root();
        let name = if spec.name.is_empty() {
            DEFAULT_ROOT_NAME.to_string()
        } else {
            spec.name.clone()
        };

        let mut tree = ActorTree {
            nodes: vec![ActorNode {
                path: name.clone(),
                name,
                actor_type: control::SEQUENCE.to_string(),
                kind: ActorKind::Control,
                shape: Shape::new(InputMode::None, false),
                parent: None,
                children: Vec::new(),
                scope: root_scope,
                own_scope: Some(root_scope),
                options: Options::new(),
                stop_flow_on_error: true,
                skip: false,
                behavior: Behavior::Control(ControlActor::Sequence),
                initialized: false,
            }],
        };

        let root = tree.root();
        tree.add_children(root, &spec.actors, registry, variables)?;
        tree.validate_pipeline(root, Some(false))?;
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &ActorNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut ActorNode {
        &mut self.nodes[id.0]
    }

    /// All node ids, parents before their children
    pub fn pre_order(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Parent, grandparent, ... up to the root
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.nodes[id.0].parent, move |p| self.nodes[p.0].parent)
    }

    /// Finds a node by its path below the root, e.g. `"loop/inner"`
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = *self.nodes[current.0]
                .children
                .iter()
                .find(|c| self.nodes[c.0].name == segment)?;
        }
        Some(current)
    }

    /// Number of leading children of `id` that run before its pipeline
    pub(crate) fn standalone_prefix(&self, id: NodeId) -> usize {
        self.nodes[id.0]
            .children
            .iter()
            .take_while(|c| self.nodes[c.0].shape.runs_standalone())
            .count()
    }

    fn add_children(
        &mut self,
        parent: NodeId,
        specs: &[ActorSpec],
        registry: &ActorRegistry,
        variables: &mut VariableScopes,
    ) -> Result<(), SetupError> {
        let mut seen = HashSet::new();
        for spec in specs {
            let name = spec.effective_name();
            if !seen.insert(name) {
                return Err(SetupError::DuplicateName {
                    parent: self.nodes[parent.0].path.clone(),
                    name: name.to_string(),
                });
            }
            let id = self.add_node(parent, spec, registry, variables)?;
            self.nodes[parent.0].children.push(id);
        }
        Ok(())
    }

    fn add_node(
        &mut self,
        parent: NodeId,
        spec: &ActorSpec,
        registry: &ActorRegistry,
        variables: &mut VariableScopes,
    ) -> Result<NodeId, SetupError> {
        let parent_node = &self.nodes[parent.0];
        let scope = parent_node.own_scope.unwrap_or(parent_node.scope);
        let name = spec.effective_name().to_string();
        let path = format!("{}/{}", parent_node.path, name);

        let (behavior, kind) = match ControlActor::from_spec(spec, registry)? {
            Some(control) => {
                let kind = control::metadata(&spec.actor_type)
                    .map(|m| m.kind)
                    .unwrap_or(ActorKind::Control);
                (Behavior::Control(control), kind)
            }
            None => {
                let actor = registry.create_actor(&spec.actor_type, &spec.options)?;
                let kind = actor.kind();
                (Behavior::Leaf(actor), kind)
            }
        };

        let own_scope = match &behavior {
            Behavior::Control(control) if control.opens_scope() => Some(variables.add_scope(scope)),
            _ => None,
        };

        if let Behavior::Leaf(_) = behavior {
            if !spec.children.is_empty() || !spec.conditions.is_empty() {
                return Err(SetupError::InvalidStructure {
                    actor: path,
                    reason: format!("'{}' cannot have children or conditions", spec.actor_type),
                });
            }
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(ActorNode {
            name,
            path,
            actor_type: spec.actor_type.clone(),
            kind,
            shape: Shape::of_kind(kind),
            parent: Some(parent),
            children: Vec::new(),
            scope,
            own_scope,
            options: spec.options.clone(),
            stop_flow_on_error: spec.stop_flow_on_error,
            skip: spec.skip,
            behavior,
            initialized: false,
        });

        if let Behavior::Control(_) = self.nodes[id.0].behavior {
            self.add_children(id, &spec.children, registry, variables)?;
            self.nodes[id.0].shape = self.control_shape(id)?;
        }
        Ok(id)
    }

    /// Checks a control node's children and derives its shape from them
    fn control_shape(&self, id: NodeId) -> Result<Shape, SetupError> {
        let node = &self.nodes[id.0];
        let children = &node.children;
        let control = match &node.behavior {
            Behavior::Control(control) => control,
            Behavior::Leaf(_) => return Ok(node.shape),
        };

        let shape = match control {
            ControlActor::Sequence => {
                self.validate_pipeline(id, None)?;
                let pipeline = &children[self.standalone_prefix(id)..];
                match (pipeline.first(), pipeline.last()) {
                    (Some(head), Some(last)) => {
                        Shape::new(self.nodes[head.0].shape.input, self.nodes[last.0].shape.output)
                    }
                    _ => Shape::new(InputMode::Optional, false),
                }
            }
            ControlActor::Trigger | ControlActor::LocalScopeTrigger(_) => {
                self.validate_pipeline(id, Some(false))?;
                Shape::new(InputMode::Optional, false)
            }
            ControlActor::Tee | ControlActor::Count { .. } => {
                self.validate_pipeline(id, Some(true))?;
                Shape::new(InputMode::Required, true)
            }
            ControlActor::IfThenElse { .. } => {
                if children.is_empty() || children.len() > 2 {
                    return Err(self.invalid(
                        id,
                        format!("expects a then and an optional else child, found {}", children.len()),
                    ));
                }
                self.branch_shape(id)?
            }
            ControlActor::Switch { conditions } => {
                let cases = conditions.len();
                if cases == 0 {
                    return Err(self.invalid(id, "expects at least one condition".to_string()));
                }
                if children.len() != cases && children.len() != cases + 1 {
                    return Err(self.invalid(
                        id,
                        format!(
                            "{} conditions need {} cases (or {} with a default), found {}",
                            cases,
                            cases,
                            cases + 1,
                            children.len()
                        ),
                    ));
                }
                self.branch_shape(id)?
            }
            ControlActor::TryCatch { .. } => {
                if children.len() != 2 {
                    return Err(self.invalid(
                        id,
                        format!("expects a try and a catch child, found {}", children.len()),
                    ));
                }
                self.branch_shape(id)?
            }
            ControlActor::CallableActors => Shape::new(InputMode::None, false),
            ControlActor::Callable { role, .. } => {
                if !children.is_empty() {
                    return Err(self.invalid(id, "callable references cannot have children".to_string()));
                }
                role_shape(*role)
            }
        };
        Ok(shape)
    }

    /// Shape of an actor routing its input to exactly one child.
    ///
    /// The input is required as soon as one branch requires it.
    fn branch_shape(&self, id: NodeId) -> Result<Shape, SetupError> {
        let mut input = InputMode::Optional;
        let mut output = false;
        for &child in &self.nodes[id.0].children {
            let shape = self.nodes[child.0].shape;
            if shape.is_standalone() {
                return Err(self.invalid(
                    child,
                    "a branch must consume or produce tokens".to_string(),
                ));
            }
            if shape.input == InputMode::Required {
                input = InputMode::Required;
            }
            output |= shape.output;
        }
        Ok(Shape::new(input, output))
    }

    /// Checks `standalone* [head] (transformer | sink | control)*`.
    ///
    /// `receives_input` tells whether the pipeline head gets a token:
    /// `Some(false)` for trigger-like scopes, `Some(true)` for tee-like
    /// ones, `None` when that depends on the caller.
    fn validate_pipeline(&self, id: NodeId, receives_input: Option<bool>) -> Result<(), SetupError> {
        let node = &self.nodes[id.0];
        let pipeline = &node.children[self.standalone_prefix(id)..];

        for (position, &child) in pipeline.iter().enumerate() {
            let shape = self.nodes[child.0].shape;
            if shape.is_standalone() {
                return Err(self.invalid(
                    child,
                    format!("standalone actors must come first in '{}'", node.path),
                ));
            }

            if position == 0 {
                match receives_input {
                    Some(false) if shape.input == InputMode::Required => {
                        return Err(self.invalid(
                            child,
                            format!("requires an input token but '{}' provides none", node.path),
                        ));
                    }
                    Some(true) if shape.input == InputMode::None => {
                        return Err(self.invalid(
                            child,
                            format!("cannot start the sub-flow of '{}', which receives a token", node.path),
                        ));
                    }
                    _ => {}
                }
                continue;
            }

            let previous = &self.nodes[pipeline[position - 1].0];
            if !previous.shape.output {
                return Err(self.invalid(
                    child,
                    format!("follows '{}', which produces no output", previous.name),
                ));
            }
            if shape.input == InputMode::None {
                return Err(self.invalid(child, "sources may only start a pipeline".to_string()));
            }
        }
        Ok(())
    }

    fn invalid(&self, id: NodeId, reason: String) -> SetupError {
        SetupError::InvalidStructure {
            actor: self.nodes[id.0].path.clone(),
            reason,
        }
    }
}

pub(crate) fn role_shape(role: CallableRole) -> Shape {
    match role {
        CallableRole::Source => Shape::new(InputMode::None, true),
        CallableRole::Transformer => Shape::new(InputMode::Required, true),
        CallableRole::Sink => Shape::new(InputMode::Required, false),
    }
}
