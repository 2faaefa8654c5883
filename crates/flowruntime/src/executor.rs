//! Recursive execution of an actor tree.
//!
//! A scope invocation resets its children, runs the leading standalones,
//! then feeds tokens depth-first through the pipeline: every token leaving
//! one child is pushed through all later children before the next token is
//! produced. A leaf source at the head of a scope is streamed this way until
//! it reports no output.

use crate::callable::CallableActorRegistry;
use crate::control::{CallableRole, ControlActor, LocalScope, ScopeHandling};
use crate::instance::FlowInstance;
use crate::tree::{Behavior, InputMode, NodeId};
use flowcore::{
    ActorContext, ActorFailure, ActorInfo, ConditionContext, ExecutionError, SetupError,
    StorageName, Token,
};
use futures::future::BoxFuture;
use std::collections::HashMap;
use tracing::{debug, warn};

type Tokens = Result<Vec<Token>, ActorFailure>;

/// What a control node does, detached from the tree borrow
enum Step {
    Sequence,
    Trigger,
    Tee,
    IfThenElse,
    Switch(usize),
    Count,
    LocalScope(LocalScope),
    TryCatch(Option<String>),
    Container,
    Callable(CallableRole, Option<NodeId>),
}

impl Step {
    fn of(control: &ControlActor) -> Self {
        match control {
            ControlActor::Sequence => Step::Sequence,
            ControlActor::Trigger => Step::Trigger,
            ControlActor::Tee => Step::Tee,
            ControlActor::IfThenElse { .. } => Step::IfThenElse,
            ControlActor::Switch { conditions } => Step::Switch(conditions.len()),
            ControlActor::Count { .. } => Step::Count,
            ControlActor::LocalScopeTrigger(settings) => Step::LocalScope(settings.clone()),
            ControlActor::TryCatch { error_variable } => Step::TryCatch(error_variable.clone()),
            ControlActor::CallableActors => Step::Container,
            ControlActor::Callable { role, target, .. } => Step::Callable(*role, *target),
        }
    }
}

impl FlowInstance {
    /// Resolves callable references, then sets up every actor, parents first.
    ///
    /// Stops at the first failure; nodes set up so far stay marked as
    /// initialized so that wrap-up reaches them.
    pub(crate) async fn set_up_actors(&mut self) -> Result<(), SetupError> {
        let callables = CallableActorRegistry::build(&self.tree);
        for (reference, target) in callables.resolve_all(&self.tree)? {
            if let Behavior::Control(ControlActor::Callable { target: slot, .. }) =
                &mut self.tree.node_mut(reference).behavior
            {
                *slot = Some(target);
            }
        }

        let ids: Vec<NodeId> = self.tree.pre_order().collect();
        for id in ids {
            let node = self.tree.node_mut(id);
            if let Behavior::Leaf(actor) = &mut node.behavior {
                let mut ctx = ActorContext::new(
                    &node.path,
                    node.options.clone(),
                    node.scope,
                    &mut self.variables,
                    &mut self.storage,
                    self.cancellation.clone(),
                );
                actor.set_up(&mut ctx).await.map_err(|e| match e {
                    SetupError::ActorSetUp { .. } => e,
                    other => SetupError::ActorSetUp {
                        actor: node.path.clone(),
                        reason: other.to_string(),
                    },
                })?;
            }
            node.initialized = true;
        }
        Ok(())
    }

    /// Wraps up every initialized actor exactly once, parents first
    pub(crate) async fn wrap_up_actors(&mut self) {
        let ids: Vec<NodeId> = self.tree.pre_order().collect();
        for id in ids {
            let node = self.tree.node_mut(id);
            if !node.initialized {
                continue;
            }
            node.initialized = false;
            if let Behavior::Leaf(actor) = &mut node.behavior {
                debug!(actor = %node.path, "Wrapping up");
                actor.wrap_up().await;
            }
        }
        self.storage.clear();
    }

    pub(crate) async fn execute_root(&mut self) -> Tokens {
        let root = self.tree.root();
        self.run_scope(root, None).await
    }

    fn run_scope(&mut self, scope: NodeId, input: Option<Token>) -> BoxFuture<'_, Tokens> {
        Box::pin(async move {
            let children = self.tree.node(scope).children.clone();
            for &child in &children {
                self.reset_node(child);
            }

            let split = self.tree.standalone_prefix(scope);
            for &standalone in &children[..split] {
                self.guarded(standalone, None).await?;
            }

            let pipeline = &children[split..];
            let Some(&head) = pipeline.first() else {
                return Ok(Vec::new());
            };

            let (stream, head_input) = {
                let node = self.tree.node(head);
                let head_input = match node.shape.input {
                    InputMode::None => None,
                    _ => input,
                };
                (node.is_leaf_source() && !node.skip, head_input)
            };

            let mut outputs = Vec::new();
            if stream {
                loop {
                    self.check_stopped(head)?;
                    let tokens = match self.execute_leaf(head, None).await {
                        Ok(tokens) => tokens,
                        Err(failure) => {
                            self.tolerate(head, failure)?;
                            break;
                        }
                    };
                    if tokens.is_empty() {
                        break;
                    }
                    for token in tokens {
                        outputs.extend(self.push(pipeline, 1, token).await?);
                    }
                }
            } else {
                for token in self.guarded(head, head_input).await? {
                    outputs.extend(self.push(pipeline, 1, token).await?);
                }
            }
            Ok(outputs)
        })
    }

    /// Pushes `token` through `pipeline[index..]`, depth-first
    fn push<'a>(
        &'a mut self,
        pipeline: &'a [NodeId],
        index: usize,
        token: Token,
    ) -> BoxFuture<'a, Tokens> {
        Box::pin(async move {
            let Some(&id) = pipeline.get(index) else {
                return Ok(vec![token]);
            };

            let mut outputs = Vec::new();
            for next in self.guarded(id, Some(token)).await? {
                outputs.extend(self.push(pipeline, index + 1, next).await?);
            }
            Ok(outputs)
        })
    }

    /// Invokes `id`, dropping the token instead of failing when the actor tolerates errors
    async fn guarded(&mut self, id: NodeId, input: Option<Token>) -> Tokens {
        match self.invoke(id, input).await {
            Ok(tokens) => Ok(tokens),
            Err(failure) => {
                self.tolerate(id, failure)?;
                Ok(Vec::new())
            }
        }
    }

    fn tolerate(&self, id: NodeId, failure: ActorFailure) -> Result<(), ActorFailure> {
        let node = self.tree.node(id);
        if node.stop_flow_on_error || failure.is_fatal() {
            return Err(failure);
        }
        warn!(actor = %node.path, "Dropping token after error: {}", failure);
        Ok(())
    }

    /// Runs one node for one input. Leaf sources restart and get drained.
    fn invoke(&mut self, id: NodeId, input: Option<Token>) -> BoxFuture<'_, Tokens> {
        Box::pin(async move {
            self.check_stopped(id)?;

            let (skip, is_leaf, is_source) = {
                let node = self.tree.node(id);
                debug!(actor = %node.path, "Invoking");
                (
                    node.skip,
                    matches!(node.behavior, Behavior::Leaf(_)),
                    node.is_leaf_source(),
                )
            };

            if skip {
                return Ok(self.skipped(id, input));
            }

            if is_source {
                self.reset_node(id);
                let mut outputs = Vec::new();
                loop {
                    self.check_stopped(id)?;
                    let tokens = match self.execute_leaf(id, None).await {
                        Ok(tokens) => tokens,
                        Err(failure) => {
                            // a tolerated failure ends the source, keeping what it produced
                            self.tolerate(id, failure)?;
                            break;
                        }
                    };
                    if tokens.is_empty() {
                        break;
                    }
                    outputs.extend(tokens);
                }
                return Ok(outputs);
            }

            if is_leaf {
                return self.execute_leaf(id, input).await;
            }

            let tokens = self.execute_control(id, input).await?;
            self.notify_tokens(id, &tokens);
            Ok(tokens)
        })
    }

    /// A skipped actor forwards its input if it both accepts and produces tokens
    fn skipped(&self, id: NodeId, input: Option<Token>) -> Vec<Token> {
        let shape = self.tree.node(id).shape;
        match input {
            Some(token) if shape.input != InputMode::None && shape.output => vec![token],
            _ => Vec::new(),
        }
    }

    /// One `execute` call of a leaf actor, with freshly expanded options
    async fn execute_leaf(&mut self, id: NodeId, input: Option<Token>) -> Tokens {
        let node = self.tree.node_mut(id);
        let contract = match (node.shape.input, &input) {
            (InputMode::None, Some(_)) => Some("does not accept an input token"),
            (InputMode::Required, None) => Some("requires an input token"),
            _ => None,
        };

        let result = match contract {
            Some(reason) => Err(ExecutionError::Contract(format!("'{}' {}", node.path, reason))),
            None => match self.variables.expand_options(node.scope, &node.options) {
                Err(e) => Err(e),
                Ok(options) => match &mut node.behavior {
                    Behavior::Leaf(actor) => {
                        let mut ctx = ActorContext::new(
                            &node.path,
                            options,
                            node.scope,
                            &mut self.variables,
                            &mut self.storage,
                            self.cancellation.clone(),
                        );
                        actor.execute(&mut ctx, input).await
                    }
                    Behavior::Control(_) => Err(ExecutionError::Contract(format!(
                        "'{}' is not a leaf actor",
                        node.path
                    ))),
                },
            },
        };

        match result {
            Ok(outcome) => {
                let path = &self.tree.node(id).path;
                let tokens: Vec<Token> = outcome
                    .into_tokens()
                    .into_iter()
                    .map(|token| match token.provenance() {
                        Some(_) => token,
                        None => token.with_provenance(path.as_str()),
                    })
                    .collect();
                self.notify_tokens(id, &tokens);
                Ok(tokens)
            }
            Err(error) => Err(self.fail(id, error)),
        }
    }

    async fn execute_control(&mut self, id: NodeId, input: Option<Token>) -> Tokens {
        let (step, children) = {
            let node = self.tree.node(id);
            match node.control() {
                Some(control) => (Step::of(control), node.children.clone()),
                None => {
                    return Err(self.fail(
                        id,
                        ExecutionError::Contract("not a control actor".to_string()),
                    ))
                }
            }
        };

        match step {
            Step::Sequence => {
                self.enter_scope(id);
                self.run_scope(id, input).await
            }
            Step::Trigger => {
                self.enter_scope(id);
                self.run_scope(id, None).await?;
                Ok(Vec::new())
            }
            Step::Tee => {
                let token = self.require_input(id, input)?;
                self.enter_scope(id);
                self.run_scope(id, Some(token.clone())).await?;
                Ok(vec![token])
            }
            Step::Count => {
                let token = self.require_input(id, input)?;
                if self.evaluate(id, 0, Some(&token))? {
                    self.enter_scope(id);
                    self.run_scope(id, Some(token.clone())).await?;
                }
                Ok(vec![token])
            }
            Step::IfThenElse => {
                let branch = if self.evaluate(id, 0, input.as_ref())? {
                    children.first()
                } else {
                    children.get(1)
                };
                match branch.copied() {
                    Some(branch) => self.guarded(branch, input).await,
                    None => Ok(Vec::new()),
                }
            }
            Step::Switch(cases) => {
                let mut selected = None;
                for index in 0..cases {
                    if self.evaluate(id, index, input.as_ref())? {
                        selected = children.get(index).copied();
                        break;
                    }
                }
                // a trailing extra child is the default case
                if selected.is_none() && children.len() > cases {
                    selected = children.last().copied();
                }
                match selected {
                    Some(case) => self.guarded(case, input).await,
                    None => Ok(Vec::new()),
                }
            }
            Step::LocalScope(settings) => self.run_local_scope(id, settings).await,
            Step::TryCatch(error_variable) => {
                let (Some(&attempt), Some(&fallback)) = (children.first(), children.get(1)) else {
                    return Err(self.fail(
                        id,
                        ExecutionError::Contract("try/catch needs two children".to_string()),
                    ));
                };
                match self.invoke(attempt, input.clone()).await {
                    Err(failure) if !failure.is_fatal() => {
                        let scope = {
                            let node = self.tree.node(id);
                            warn!(actor = %node.path, "Caught error: {}", failure);
                            node.scope
                        };
                        if let Some(variable) = error_variable {
                            self.variables.set(scope, variable, failure.error.to_string());
                        }
                        self.guarded(fallback, input).await
                    }
                    other => other,
                }
            }
            Step::Container => Ok(Vec::new()),
            Step::Callable(role, target) => {
                let Some(target) = target else {
                    return Err(self.fail(
                        id,
                        ExecutionError::Contract("callable reference was never resolved".to_string()),
                    ));
                };
                match role {
                    CallableRole::Source => self.guarded(target, None).await,
                    CallableRole::Transformer => self.guarded(target, input).await,
                    CallableRole::Sink => {
                        self.guarded(target, input).await?;
                        Ok(Vec::new())
                    }
                }
            }
        }
    }

    /// Trigger with its own variables and storage frame
    async fn run_local_scope(&mut self, id: NodeId, settings: LocalScope) -> Tokens {
        let (outer, inner) = {
            let node = self.tree.node(id);
            (node.scope, node.own_scope)
        };
        let Some(inner) = inner else {
            return Err(self.fail(
                id,
                ExecutionError::Contract("local scope without variable scope".to_string()),
            ));
        };

        self.variables.clear(inner);
        match settings.variables {
            ScopeHandling::Share => {}
            ScopeHandling::Empty => self.variables.set_isolated(inner, true),
            ScopeHandling::Copy => {
                for (name, value) in self.variables.visible(outer) {
                    if settings.variables_filter.is_match(&name) {
                        self.variables.set(inner, name, value);
                    }
                }
                self.variables.set_isolated(inner, true);
            }
        }

        let pushed = match settings.storage {
            ScopeHandling::Share => false,
            ScopeHandling::Empty => {
                self.storage.push_frame(HashMap::new());
                true
            }
            ScopeHandling::Copy => {
                let frame = self
                    .storage
                    .snapshot()
                    .into_iter()
                    .filter(|(name, _)| settings.storage_filter.is_match(name))
                    .collect();
                self.storage.push_frame(frame);
                true
            }
        };

        let result = self.run_scope(id, None).await;
        let frame = if pushed { self.storage.pop_frame() } else { None };

        if result.is_ok() {
            for (name, value) in self.variables.local(inner) {
                // shared variables always reach the outer scope
                let leaks = match (settings.variables, &settings.propagate_variables) {
                    (ScopeHandling::Share, _) => true,
                    (_, Some(pattern)) => pattern.is_match(&name),
                    (_, None) => false,
                };
                if leaks {
                    self.variables.set(outer, name, value);
                }
            }

            if let (Some(pattern), Some(frame)) = (&settings.propagate_storage, frame) {
                for (name, value) in frame {
                    if pattern.is_match(&name) {
                        self.storage.put(&StorageName::flow(name), value);
                    }
                }
            }
        }

        result.map(|_| Vec::new())
    }

    fn require_input(&self, id: NodeId, input: Option<Token>) -> Result<Token, ActorFailure> {
        input.ok_or_else(|| {
            self.fail(
                id,
                ExecutionError::Contract("requires an input token".to_string()),
            )
        })
    }

    fn evaluate(
        &mut self,
        id: NodeId,
        index: usize,
        token: Option<&Token>,
    ) -> Result<bool, ActorFailure> {
        let node = self.tree.node_mut(id);
        let ctx = ConditionContext::new(node.scope, &self.variables, &self.storage);
        let result = match &mut node.behavior {
            Behavior::Control(control) => match control.condition_mut(index) {
                Some(condition) => condition.evaluate(&ctx, token),
                None => Err(ExecutionError::Contract(format!("no condition #{}", index))),
            },
            Behavior::Leaf(_) => Err(ExecutionError::Contract(
                "leaf actors have no conditions".to_string(),
            )),
        };

        match result {
            Ok(matched) => {
                debug!(actor = %self.tree.node(id).path, index, matched, "Evaluated condition");
                Ok(matched)
            }
            Err(error) => Err(self.fail(id, error)),
        }
    }

    /// Clears the variables a scope-opening actor owns; the root keeps its bindings
    fn enter_scope(&mut self, id: NodeId) {
        if id == self.tree.root() {
            return;
        }
        if let Some(scope) = self.tree.node(id).own_scope {
            self.variables.clear(scope);
        }
    }

    /// Returns a node to its initial state. Branching actors pass the reset on
    /// to their children; scope-opening ones reset theirs when invoked.
    fn reset_node(&mut self, id: NodeId) {
        let node = self.tree.node_mut(id);
        let descend = match &mut node.behavior {
            Behavior::Leaf(actor) => {
                actor.reset();
                false
            }
            Behavior::Control(control) => {
                control.reset();
                !control.opens_scope()
            }
        };
        if descend {
            let children = node.children.clone();
            for child in children {
                self.reset_node(child);
            }
        }
    }

    fn check_stopped(&self, id: NodeId) -> Result<(), ActorFailure> {
        if self.cancellation.is_cancelled() {
            Err(ActorFailure::new(
                self.tree.node(id).path.clone(),
                ExecutionError::Cancelled,
            ))
        } else {
            Ok(())
        }
    }

    /// Attributes `error` to `id` and reports it
    fn fail(&self, id: NodeId, error: ExecutionError) -> ActorFailure {
        if error != ExecutionError::Cancelled {
            self.listener.on_error(&self.actor_info(id), &error);
        }
        ActorFailure::new(self.tree.node(id).path.clone(), error)
    }

    fn notify_tokens(&self, id: NodeId, tokens: &[Token]) {
        if tokens.is_empty() {
            return;
        }
        let info = self.actor_info(id);
        for token in tokens {
            self.listener.on_token(&info, token);
        }
    }

    pub(crate) fn actor_info(&self, id: NodeId) -> ActorInfo {
        let node = self.tree.node(id);
        ActorInfo {
            execution_id: self.info.execution_id,
            name: node.path.clone(),
            actor_type: node.actor_type.clone(),
            kind: node.kind,
        }
    }
}
